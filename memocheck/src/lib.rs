//! # memocheck
//!
//! Behavior tests for a distributed memoization service, run against
//! clusters the harness starts and stops itself.
//!
//! ## Crate Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │               memocheck (this crate)                     │
//! │   Re-exports everything + standard fixtures + CLI        │
//! ├──────────────────────────────────────────────────────────┤
//! │               memocheck-harness                          │
//! │  • ClusterManager        • Fixture / FixtureSession      │
//! │  • StableNodeSelector    • BehaviorSuite / TestComposer  │
//! │  • RetryExecutor         • HarnessRunner / RunReport     │
//! │  • SimLauncher, ProcessLauncher                          │
//! ├──────────────────────────────────────────────────────────┤
//! │               memocheck-core                             │
//! │  NodeLauncher, NodeProcess, MemoClient, TimeProvider     │
//! │  ClusterId, NodeId, NodeInfo, NodeState                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use memocheck::{standard_fixtures, standard_suites, HarnessRunner, SimLauncher};
//!
//! let launcher = Arc::new(SimLauncher::default());
//! let report = HarnessRunner::new()
//!     .fixtures(standard_fixtures(launcher))
//!     .suites(standard_suites())
//!     .run()
//!     .await;
//! std::process::exit(report.exit_code());
//! ```
//!
//! ## Which Crate to Use
//!
//! | Use case | Crate |
//! |----------|-------|
//! | Everything, plus the `memocheck` binary | `memocheck` |
//! | Launcher and client contracts only | `memocheck-core` |
//! | The engine without the CLI | `memocheck-harness` |

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

pub use memocheck_core::*;
pub use memocheck_harness::*;

pub mod cli;

/// The two stock fixtures: one node, and ten nodes read through under retry.
pub fn standard_fixtures(launcher: Arc<dyn NodeLauncher>) -> Vec<Fixture> {
    vec![
        Fixture::single_node(launcher.clone()),
        Fixture::known_stable_nodes(launcher),
    ]
}

/// Every built-in suite.
pub fn standard_suites() -> Vec<Arc<dyn BehaviorSuite>> {
    vec![Arc::new(UserSuite), Arc::new(ReachabilitySuite)]
}

/// Launcher described by `config`: the external service command when one is
/// set, in-process nodes otherwise.
pub fn launcher_for(config: &HarnessConfig) -> HarnessResult<Arc<dyn NodeLauncher>> {
    match &config.service_command {
        Some(command) => Ok(Arc::new(ProcessLauncher::from_command_line(command)?)),
        None => Ok(Arc::new(SimLauncher::new(config.sim_config()))),
    }
}

/// Runner for the single-node fixture and the configured fixture against
/// every built-in suite.
pub fn runner_for(config: &HarnessConfig, verbosity: u8) -> HarnessResult<HarnessRunner> {
    let launcher = launcher_for(config)?;
    let single = Fixture::single_node(launcher.clone())
        .with_cluster_config(config.cluster_config())
        .with_isolation(config.isolation);

    let mut runner = HarnessRunner::new()
        .fixture(single)
        .fixture(config.fixture(launcher)?)
        .suites(standard_suites())
        .parallelism(config.parallelism)
        .reporter(Arc::new(TextReporter::new(verbosity)));
    if let Some(pattern) = &config.filter {
        runner = runner.filter(pattern.clone());
    }
    Ok(runner)
}

/// Build the runner for `config`, run it and return the report.
pub async fn run(config: &HarnessConfig, verbosity: u8) -> HarnessResult<RunReport> {
    let runner = runner_for(config, verbosity)?;
    tracing::info!(
        nodes = config.nodes,
        strategy = %config.strategy,
        retry = config.retry.enabled,
        parallelism = config.parallelism,
        "Starting memocheck run"
    );
    let report = runner.run().await;
    if report.is_success() {
        tracing::info!("All {} case(s) passed", report.cases.len());
    } else {
        tracing::warn!(
            "{} of {} case(s) did not pass",
            report.cases.len() - report.passed(),
            report.cases.len()
        );
    }
    Ok(report)
}
