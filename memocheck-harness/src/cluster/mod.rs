//! Clusters of memo-service nodes and the manager that starts and stops them.
//!
//! ## Submodules
//!
//! - `config` - ClusterConfig timeouts
//! - `manager` - ClusterManager: start(n), stop, with_cluster

pub mod config;
pub mod manager;

use std::fmt;

use memocheck_core::{ClusterId, NodeId, NodeInfo, NodeProcess, NodeState};

pub use config::ClusterConfig;
pub use manager::{ClusterManager, TeardownReport};

/// One running instance of the memo service.
///
/// Owns its process handle exclusively. Only the [`ClusterManager`] changes
/// its state.
pub struct Node {
    id: NodeId,
    address: String,
    state: NodeState,
    ready_seq: Option<u64>,
    process: Box<dyn NodeProcess>,
}

impl Node {
    pub(crate) fn starting(id: NodeId, process: Box<dyn NodeProcess>) -> Self {
        Self {
            id,
            address: process.address().to_string(),
            state: NodeState::Starting,
            ready_seq: None,
            process,
        }
    }

    /// Node identity.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Address the node serves on.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Current lifecycle state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Order in which the node became ready, if it did.
    pub fn ready_seq(&self) -> Option<u64> {
        self.ready_seq
    }

    /// Snapshot for suites. `None` unless the node is ready.
    pub fn info(&self) -> Option<NodeInfo> {
        match (self.state, self.ready_seq) {
            (NodeState::Ready, Some(ready_seq)) => Some(NodeInfo {
                id: self.id,
                address: self.address.clone(),
                ready_seq,
            }),
            _ => None,
        }
    }

    pub(crate) fn mark_ready(&mut self, seq: u64) {
        self.state = NodeState::Ready;
        self.ready_seq = Some(seq);
    }

    pub(crate) fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }

    pub(crate) fn process_mut(&mut self) -> &mut dyn NodeProcess {
        self.process.as_mut()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("state", &self.state)
            .field("ready_seq", &self.ready_seq)
            .finish()
    }
}

/// Fixed-size, ordered set of nodes started together.
///
/// A scoped resource: hand it back to [`ClusterManager::stop`] on every exit
/// path. Dropping an unstopped cluster kills its nodes without waiting and
/// logs a warning.
#[derive(Debug)]
pub struct Cluster {
    id: ClusterId,
    nodes: Vec<Node>,
    stopped: bool,
}

impl Cluster {
    pub(crate) fn new(id: ClusterId, mut nodes: Vec<Node>) -> Self {
        nodes.sort_by_key(|n| n.id.index);
        Self {
            id,
            nodes,
            stopped: false,
        }
    }

    /// Cluster identity.
    pub fn id(&self) -> ClusterId {
        self.id
    }

    /// Number of nodes, fixed at creation.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// All nodes in spawn order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Nodes currently ready.
    pub fn ready_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.state == NodeState::Ready)
    }

    /// Number of nodes currently serving.
    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.state.is_live()).count()
    }

    /// Whether the cluster contains a node with this id.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.iter().any(|n| &n.id == id)
    }

    /// Whether [`ClusterManager::stop`] already ran on this cluster.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.stopped = true;
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        let pending: Vec<_> = self
            .nodes
            .iter_mut()
            .filter(|n| n.state != NodeState::Stopped)
            .collect();
        if pending.is_empty() {
            return;
        }
        tracing::warn!(
            "Cluster {} dropped without stop, killing {} node(s)",
            self.id,
            pending.len()
        );
        for node in pending {
            node.process.kill_now();
            node.state = NodeState::Stopped;
        }
    }
}
