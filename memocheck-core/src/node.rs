//! Node identity types.
//!
//! A node is identified by the cluster it was started into plus its spawn
//! index. Cluster ids are random per `start` call, so two clusters alive at the
//! same time never share a node identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one started cluster.
///
/// # Examples
///
/// ```
/// use memocheck_core::ClusterId;
///
/// let id = ClusterId::new(0x2a);
/// assert_eq!(id.to_string(), "000000000000002a");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(u64);

impl ClusterId {
    /// Create a cluster id with an explicit value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Create a fresh random cluster id.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Raw value.
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Parse the hex form produced by `Display`.
    pub fn parse_hex(s: &str) -> Option<Self> {
        u64::from_str_radix(s, 16).ok().map(Self)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Identity of a node: owning cluster plus spawn index.
///
/// Ordering is cluster first, then index, which gives the ascending order used
/// to break ties when selecting stable nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    /// Cluster this node belongs to.
    pub cluster: ClusterId,
    /// Position in the cluster, starting at 0.
    pub index: u32,
}

impl NodeId {
    /// Create a node id.
    pub const fn new(cluster: ClusterId, index: u32) -> Self {
        Self { cluster, index }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster, self.index)
    }
}

/// What a launcher needs to know to spawn one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSpec {
    /// Cluster the node is spawned into.
    pub cluster: ClusterId,
    /// Spawn index within the cluster.
    pub index: u32,
}

impl NodeSpec {
    /// Create a spawn specification.
    pub const fn new(cluster: ClusterId, index: u32) -> Self {
        Self { cluster, index }
    }

    /// Identity the spawned node will have.
    pub const fn node_id(&self) -> NodeId {
        NodeId::new(self.cluster, self.index)
    }
}

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    /// Spawned, readiness not yet reported.
    Starting,
    /// Reported ready and serving.
    Ready,
    /// Terminated cleanly.
    Stopped,
    /// Failed to become ready or failed to terminate cleanly.
    Failed,
}

impl NodeState {
    /// Whether the node counts as live (serving requests).
    pub fn is_live(&self) -> bool {
        matches!(self, NodeState::Ready)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Starting => "starting",
            NodeState::Ready => "ready",
            NodeState::Stopped => "stopped",
            NodeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot of a ready node, handed to behavior suites.
///
/// Carries no process handle: holding a `NodeInfo` never keeps a node alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node identity.
    pub id: NodeId,
    /// Address the node serves on.
    pub address: String,
    /// Order in which the node reported ready within its cluster (0 = first).
    pub ready_seq: u64,
}
