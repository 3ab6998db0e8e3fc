//! Environment fixtures.
//!
//! A [`Fixture`] describes an environment: how many nodes, which of them count
//! as stable, and how operations are retried. It is an immutable definition
//! shared by every test case composed from it; each execution gets its own
//! [`FixtureSession`] and therefore its own fresh cluster.
//!
//! ## Submodules
//!
//! - `session` - FixtureSession and the FixtureState lifecycle

pub mod session;

use std::fmt;
use std::sync::Arc;

use memocheck_core::NodeLauncher;
use serde::{Deserialize, Serialize};

use crate::cluster::{ClusterConfig, ClusterManager};
use crate::retry::RetryPolicy;
use crate::selector::StabilityStrategy;

pub use session::{FixtureSession, FixtureState};

/// How clusters are shared between the operations of one test case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Fresh cluster for every operation.
    #[default]
    PerOperation,
    /// One cluster for all operations of the case.
    PerCase,
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Isolation::PerOperation => f.write_str("per-operation"),
            Isolation::PerCase => f.write_str("per-case"),
        }
    }
}

/// Reusable definition of a test environment.
#[derive(Clone)]
pub struct Fixture {
    name: String,
    cluster_size: usize,
    strategy: StabilityStrategy,
    retry: RetryPolicy,
    cluster_config: ClusterConfig,
    isolation: Isolation,
    launcher: Arc<dyn NodeLauncher>,
}

impl fmt::Debug for Fixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fixture")
            .field("name", &self.name)
            .field("cluster_size", &self.cluster_size)
            .field("strategy", &self.strategy)
            .field("retry", &self.retry)
            .field("cluster_config", &self.cluster_config)
            .field("isolation", &self.isolation)
            .field("launcher", &self.launcher.name())
            .finish()
    }
}

impl Fixture {
    /// Single-node fixture without retry. Adjust with the `with_*` methods.
    pub fn new(name: impl Into<String>, launcher: Arc<dyn NodeLauncher>) -> Self {
        Self {
            name: name.into(),
            cluster_size: 1,
            strategy: StabilityStrategy::AllNodes,
            retry: RetryPolicy::disabled(),
            cluster_config: ClusterConfig::default(),
            isolation: Isolation::default(),
            launcher,
        }
    }

    /// One known-stable node, no retry needed.
    pub fn single_node(launcher: Arc<dyn NodeLauncher>) -> Self {
        Self::new("single_known_stable_node", launcher)
    }

    /// Ten nodes, all of them known stable, with retry enabled so reads
    /// through a different node than the write can wait out replication.
    pub fn known_stable_nodes(launcher: Arc<dyn NodeLauncher>) -> Self {
        Self::new("multiple_known_stable_nodes", launcher)
            .with_cluster_size(10)
            .with_retry(RetryPolicy::eventual(3))
    }

    /// Set the cluster size.
    pub fn with_cluster_size(mut self, size: usize) -> Self {
        self.cluster_size = size;
        self
    }

    /// Set the stability strategy.
    pub fn with_strategy(mut self, strategy: StabilityStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the cluster timeouts.
    pub fn with_cluster_config(mut self, config: ClusterConfig) -> Self {
        self.cluster_config = config;
        self
    }

    /// Set the isolation mode.
    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Rename the fixture.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fixture name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nodes started per cluster.
    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    /// Stability strategy.
    pub fn strategy(&self) -> StabilityStrategy {
        self.strategy
    }

    /// Retry policy handed to every operation.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Cluster timeouts.
    pub fn cluster_config(&self) -> &ClusterConfig {
        &self.cluster_config
    }

    /// Isolation mode.
    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    /// Launcher nodes are spawned through.
    pub fn launcher(&self) -> &Arc<dyn NodeLauncher> {
        &self.launcher
    }

    /// Size of the stable set once a cluster is fully ready.
    pub fn guaranteed_stable_nodes(&self) -> Option<usize> {
        self.strategy.guaranteed_size(self.cluster_size)
    }

    /// Manager starting this fixture's clusters.
    pub fn manager(&self) -> ClusterManager {
        ClusterManager::new(self.launcher.clone(), self.cluster_config.clone())
    }
}

#[cfg(test)]
mod tests {
    use crate::launchers::SimLauncher;

    use super::*;

    #[test]
    fn test_known_stable_nodes_preset() {
        let fixture = Fixture::known_stable_nodes(Arc::new(SimLauncher::default()));
        assert_eq!(fixture.cluster_size(), 10);
        assert_eq!(fixture.strategy(), StabilityStrategy::AllNodes);
        assert!(fixture.retry().enabled());
        assert_eq!(fixture.retry().max_attempts(), 3);
        assert_eq!(fixture.isolation(), Isolation::PerOperation);
        assert_eq!(fixture.guaranteed_stable_nodes(), Some(10));
    }

    #[test]
    fn test_guaranteed_stable_nodes_follows_strategy() {
        let fixture = Fixture::new("f", Arc::new(SimLauncher::default()))
            .with_cluster_size(5)
            .with_strategy(StabilityStrategy::ExcludeNewest(5));
        assert_eq!(fixture.guaranteed_stable_nodes(), None);
        let fixture = fixture.with_strategy(StabilityStrategy::Majority);
        assert_eq!(fixture.guaranteed_stable_nodes(), Some(3));
    }
}
