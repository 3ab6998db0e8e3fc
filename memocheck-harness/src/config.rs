//! File-based harness configuration.
//!
//! All durations are milliseconds. Every field has a default, so a config file
//! only needs the values it changes:
//!
//! ```json
//! {
//!   "nodes": 10,
//!   "strategy": { "exclude_newest": 1 },
//!   "retry": { "max_attempts": 5, "backoff_ms": 50 },
//!   "sim": { "replication_delay_ms": 30 }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use memocheck_core::NodeLauncher;
use serde::{Deserialize, Serialize};

use crate::cluster::ClusterConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::fixture::{Fixture, Isolation};
use crate::launchers::SimLauncherConfig;
use crate::retry::{Backoff, RetryPolicy};
use crate::selector::StabilityStrategy;

/// Retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Whether transient failures are retried.
    pub enabled: bool,
    /// Total attempts, first one included.
    pub max_attempts: u32,
    /// Delay between attempts, or initial delay when exponential.
    pub backoff_ms: u64,
    /// Double the delay after each failed attempt.
    pub exponential: bool,
    /// Cap on the exponential delay.
    pub max_backoff_ms: u64,
    /// Add random jitter to exponential delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            backoff_ms: 100,
            exponential: false,
            max_backoff_ms: 2_000,
            jitter: false,
        }
    }
}

/// Cluster timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Per-node readiness timeout.
    pub ready_ms: u64,
    /// Whole-cluster start timeout.
    pub start_ms: u64,
    /// Per-node stop timeout.
    pub stop_ms: u64,
    /// Per-operation timeout.
    pub operation_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        let defaults = ClusterConfig::default();
        Self {
            ready_ms: defaults.ready_timeout.as_millis() as u64,
            start_ms: defaults.start_timeout.as_millis() as u64,
            stop_ms: defaults.stop_timeout.as_millis() as u64,
            operation_ms: defaults.operation_timeout.as_millis() as u64,
        }
    }
}

/// In-process launcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Time between spawn and ready.
    pub ready_delay_ms: u64,
    /// Time for a write to reach the other nodes.
    pub replication_delay_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        let defaults = SimLauncherConfig::default();
        Self {
            ready_delay_ms: defaults.ready_delay.as_millis() as u64,
            replication_delay_ms: defaults.replication_delay.as_millis() as u64,
        }
    }
}

/// Everything the `memocheck` binary can be configured with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Name of the configured fixture.
    pub fixture_name: String,
    /// Nodes per cluster.
    pub nodes: usize,
    /// Stability strategy.
    pub strategy: StabilityStrategy,
    /// Cluster sharing between operations.
    pub isolation: Isolation,
    /// Retry settings.
    pub retry: RetryConfig,
    /// Cluster timeouts.
    pub timeouts: TimeoutConfig,
    /// In-process launcher settings.
    pub sim: SimConfig,
    /// External service command; the in-process launcher is used when unset.
    pub service_command: Option<String>,
    /// Cases run at once.
    pub parallelism: usize,
    /// Substring filter on case names.
    pub filter: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            fixture_name: "multiple_known_stable_nodes".to_string(),
            nodes: 10,
            strategy: StabilityStrategy::AllNodes,
            isolation: Isolation::PerOperation,
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            sim: SimConfig::default(),
            service_command: None,
            parallelism: 1,
            filter: None,
        }
    }
}

impl HarnessConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> HarnessResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HarnessError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Reject values no run could use.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.nodes == 0 {
            return Err(HarnessError::Config("nodes must be at least 1".to_string()));
        }
        if self.parallelism == 0 {
            return Err(HarnessError::Config(
                "parallelism must be at least 1".to_string(),
            ));
        }
        if self.strategy.guaranteed_size(self.nodes).is_none() {
            return Err(HarnessError::Config(format!(
                "strategy {} cannot be satisfied by {} node(s)",
                self.strategy, self.nodes
            )));
        }
        self.retry_policy().map(|_| ())
    }

    /// Retry policy described by the `retry` section.
    pub fn retry_policy(&self) -> HarnessResult<RetryPolicy> {
        let r = &self.retry;
        let backoff = match (r.backoff_ms, r.exponential) {
            (0, _) => Backoff::None,
            (ms, false) => Backoff::Fixed(Duration::from_millis(ms)),
            (ms, true) => Backoff::Exponential {
                initial: Duration::from_millis(ms),
                max: Duration::from_millis(r.max_backoff_ms.max(ms)),
                jitter: r.jitter,
            },
        };
        RetryPolicy::new(r.enabled, r.max_attempts, backoff)
    }

    /// Cluster timeouts described by the `timeouts` section.
    pub fn cluster_config(&self) -> ClusterConfig {
        let t = &self.timeouts;
        ClusterConfig::new(
            Duration::from_millis(t.ready_ms),
            Duration::from_millis(t.start_ms),
            Duration::from_millis(t.stop_ms),
            Duration::from_millis(t.operation_ms),
        )
    }

    /// In-process launcher settings described by the `sim` section.
    pub fn sim_config(&self) -> SimLauncherConfig {
        SimLauncherConfig {
            ready_delay: Duration::from_millis(self.sim.ready_delay_ms),
            replication_delay: Duration::from_millis(self.sim.replication_delay_ms),
            ..SimLauncherConfig::default()
        }
    }

    /// The fixture this config describes, spawning through `launcher`.
    pub fn fixture(&self, launcher: Arc<dyn NodeLauncher>) -> HarnessResult<Fixture> {
        Ok(Fixture::new(self.fixture_name.clone(), launcher)
            .with_cluster_size(self.nodes)
            .with_strategy(self.strategy)
            .with_retry(self.retry_policy()?)
            .with_cluster_config(self.cluster_config())
            .with_isolation(self.isolation))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_mirror_known_stable_nodes() {
        let config = HarnessConfig::from_json_str("{}").unwrap();
        assert_eq!(config.nodes, 10);
        assert_eq!(config.strategy, StabilityStrategy::AllNodes);
        let policy = config.retry_policy().unwrap();
        assert!(policy.enabled());
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn test_partial_override() {
        let config = HarnessConfig::from_json_str(
            r#"{
                "nodes": 4,
                "strategy": {"exclude_newest": 1},
                "retry": {"max_attempts": 5, "backoff_ms": 10, "exponential": true},
                "timeouts": {"ready_ms": 250}
            }"#,
        )
        .unwrap();
        assert_eq!(config.nodes, 4);
        assert_eq!(config.strategy, StabilityStrategy::ExcludeNewest(1));
        assert_eq!(
            config.retry_policy().unwrap().backoff(),
            Backoff::Exponential {
                initial: Duration::from_millis(10),
                max: Duration::from_millis(2_000),
                jitter: false,
            }
        );
        let cluster = config.cluster_config();
        assert_eq!(cluster.ready_timeout, Duration::from_millis(250));
        assert_eq!(cluster.stop_timeout, ClusterConfig::default().stop_timeout);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for json in [
            r#"{"nodes": 0}"#,
            r#"{"parallelism": 0}"#,
            r#"{"retry": {"max_attempts": 0}}"#,
            r#"{"nodes": 2, "strategy": {"exclude_newest": 2}}"#,
            r#"{"strategy": {"exclude_newest": 18446744073709551615}}"#,
            r#"{"unknown_field": true}"#,
        ] {
            assert!(
                matches!(HarnessConfig::from_json_str(json), Err(HarnessError::Config(_))),
                "accepted {json}"
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"nodes": 3, "service_command": "memod --port {{port}}"}}"#).unwrap();
        let config = HarnessConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.nodes, 3);
        assert_eq!(
            config.service_command.as_deref(),
            Some("memod --port {port}")
        );
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = HarnessConfig::from_json_file(dir.path().join("absent.json"));
        assert!(matches!(result, Err(HarnessError::Config(_))));
    }
}
