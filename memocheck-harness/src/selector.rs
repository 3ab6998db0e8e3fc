//! Known-stable node selection.
//!
//! A scenario asserting on eventually consistent reads only talks to nodes
//! assumed to have converged. Which nodes those are is decided by a
//! [`StabilityStrategy`]:
//!
//! | Strategy | Selected | Needs |
//! |----------|----------|-------|
//! | `AllNodes` | every ready node | ≥ 1 ready |
//! | `ExcludeNewest(k)` | all but the k nodes that became ready last | > k ready |
//! | `Majority` | the `n/2 + 1` lowest node ids | ≥ 1 ready |
//!
//! Selection is read-only and recomputed per scenario; a [`StableNodeSet`] is a
//! snapshot of one cluster and is never reused across cluster restarts.

use std::fmt;

use memocheck_core::{ClusterId, NodeId, NodeInfo};
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::error::SelectionError;

/// Policy deciding which nodes count as known stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityStrategy {
    /// Every ready node.
    #[default]
    AllNodes,
    /// Every ready node except the `k` most recently ready ones.
    ExcludeNewest(usize),
    /// A deterministic majority: the `n/2 + 1` ready nodes with the lowest ids.
    Majority,
}

impl StabilityStrategy {
    /// Minimum number of ready nodes this strategy needs.
    pub fn required_ready(&self) -> usize {
        match self {
            StabilityStrategy::AllNodes | StabilityStrategy::Majority => 1,
            StabilityStrategy::ExcludeNewest(k) => k.saturating_add(1),
        }
    }

    /// Size of the stable set on a fully ready cluster of `cluster_size` nodes,
    /// or `None` if the strategy cannot be satisfied at that size.
    pub fn guaranteed_size(&self, cluster_size: usize) -> Option<usize> {
        if cluster_size < self.required_ready() {
            return None;
        }
        Some(match self {
            StabilityStrategy::AllNodes => cluster_size,
            StabilityStrategy::ExcludeNewest(k) => cluster_size.saturating_sub(*k),
            StabilityStrategy::Majority => majority_of(cluster_size),
        })
    }
}

impl fmt::Display for StabilityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StabilityStrategy::AllNodes => f.write_str("all-nodes"),
            StabilityStrategy::ExcludeNewest(k) => write!(f, "exclude-newest({k})"),
            StabilityStrategy::Majority => f.write_str("majority"),
        }
    }
}

fn majority_of(n: usize) -> usize {
    n / 2 + 1
}

/// Subset of one cluster's nodes considered stable, ordered by ascending id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StableNodeSet {
    cluster: ClusterId,
    strategy: StabilityStrategy,
    nodes: Vec<NodeInfo>,
}

impl StableNodeSet {
    /// Cluster this set was selected from.
    pub fn cluster_id(&self) -> ClusterId {
        self.cluster
    }

    /// Strategy that produced this set.
    pub fn strategy(&self) -> StabilityStrategy {
        self.strategy
    }

    /// Selected nodes.
    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    /// Iterate over selected nodes.
    pub fn iter(&self) -> std::slice::Iter<'_, NodeInfo> {
        self.nodes.iter()
    }

    /// Number of selected nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node at `position`.
    pub fn get(&self, position: usize) -> Option<&NodeInfo> {
        self.nodes.get(position)
    }

    /// Whether `id` is in the set.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.iter().any(|n| &n.id == id)
    }

    /// A node other than `id`, falling back to `id` itself when the set has a
    /// single node.
    pub fn other_than(&self, id: &NodeId) -> Option<&NodeInfo> {
        self.nodes
            .iter()
            .find(|n| &n.id != id)
            .or_else(|| self.nodes.iter().find(|n| &n.id == id))
    }
}

impl<'a> IntoIterator for &'a StableNodeSet {
    type Item = &'a NodeInfo;
    type IntoIter = std::slice::Iter<'a, NodeInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// Computes [`StableNodeSet`]s from running clusters.
pub struct StableNodeSelector;

impl StableNodeSelector {
    /// Select the stable nodes of `cluster` according to `strategy`.
    pub fn select(
        cluster: &Cluster,
        strategy: &StabilityStrategy,
    ) -> Result<StableNodeSet, SelectionError> {
        let mut ready: Vec<NodeInfo> = cluster.ready_nodes().filter_map(|n| n.info()).collect();

        let required = strategy.required_ready();
        if ready.len() < required {
            return Err(SelectionError::InsufficientNodes {
                strategy: *strategy,
                required,
                available: ready.len(),
            });
        }

        let mut nodes = match strategy {
            StabilityStrategy::AllNodes => ready,
            StabilityStrategy::ExcludeNewest(k) => {
                ready.sort_by_key(|n| (n.ready_seq, n.id));
                ready.truncate(ready.len() - k);
                ready
            }
            StabilityStrategy::Majority => {
                ready.sort_by_key(|n| n.id);
                ready.truncate(majority_of(ready.len()));
                ready
            }
        };

        nodes.sort_by_key(|n| n.id);
        tracing::debug!(
            "Selected {} stable node(s) of cluster {} with {}",
            nodes.len(),
            cluster.id(),
            strategy
        );

        Ok(StableNodeSet {
            cluster: cluster.id(),
            strategy: *strategy,
            nodes,
        })
    }
}
