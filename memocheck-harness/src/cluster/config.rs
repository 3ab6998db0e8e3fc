//! Timeouts governing cluster lifecycle.

use std::time::Duration;

/// Timeouts for starting, stopping and using a cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Maximum time one node may take to report ready after it was spawned.
    pub ready_timeout: Duration,

    /// Maximum time the whole `start(n)` may take, spawn and readiness included.
    pub start_timeout: Duration,

    /// Maximum time to wait for one node to terminate before killing it.
    pub stop_timeout: Duration,

    /// Maximum time a single suite operation may run, retries included.
    pub operation_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(10),
            start_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(60),
        }
    }
}

impl ClusterConfig {
    /// Create a configuration with explicit timeouts.
    pub fn new(
        ready_timeout: Duration,
        start_timeout: Duration,
        stop_timeout: Duration,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            ready_timeout,
            start_timeout,
            stop_timeout,
            operation_timeout,
        }
    }

    /// Tight timeouts for in-process nodes.
    pub fn local() -> Self {
        Self {
            ready_timeout: Duration::from_secs(1),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(1),
            operation_timeout: Duration::from_secs(10),
        }
    }

    /// Generous timeouts for real processes on a loaded CI machine.
    pub fn slow() -> Self {
        Self {
            ready_timeout: Duration::from_secs(60),
            start_timeout: Duration::from_secs(120),
            stop_timeout: Duration::from_secs(15),
            operation_timeout: Duration::from_secs(300),
        }
    }
}
