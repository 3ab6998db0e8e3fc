//! # memocheck harness
//!
//! Test orchestration for a distributed memoization service: bring up
//! clusters of service nodes, decide which of them are known to be stable,
//! retry operations through eventual-consistency windows, and run reusable
//! behavior suites against reusable environment fixtures.
//!
//! ## Core Components
//!
//! - [`ClusterManager`]: start `n` nodes behind a readiness barrier, stop them
//!   on every exit path
//! - [`StableNodeSelector`]: pick the nodes a scenario may rely on
//! - [`RetryExecutor`]: retry transient failures, never assertion failures
//! - [`Fixture`] and [`BehaviorSuite`]: environment and behavior, combined by
//!   [`TestComposer`] into [`TestCase`]s
//! - [`HarnessRunner`]: compose, run (optionally in parallel) and report
//!
//! ## Case Lifecycle
//!
//! ```text
//!  compose ──► setup ──────────────────────► operations ──► teardown ──► report
//!              │ ClusterManager::start(n)     │ sequential    │ always
//!              │ StableNodeSelector::select   │ each through  │ ClusterManager::stop
//!              │                              │ RetryExecutor │
//! ```
//!
//! ## Stability Strategies
//!
//! | Strategy | Stable set on n ready nodes |
//! |----------|-----------------------------|
//! | `AllNodes` | n |
//! | `ExcludeNewest(k)` | n - k, dropping the last k to become ready |
//! | `Majority` | n/2 + 1 lowest node ids |
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use memocheck_harness::{Fixture, HarnessRunner, SimLauncher, UserSuite};
//!
//! let launcher = Arc::new(SimLauncher::default());
//! let report = HarnessRunner::new()
//!     .fixture(Fixture::known_stable_nodes(launcher))
//!     .suite(Arc::new(UserSuite))
//!     .run()
//!     .await;
//! assert_eq!(report.exit_code(), 0);
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// Re-export core types for convenience
pub use memocheck_core::{
    ClientError, ClusterId, LaunchError, LaunchResult, MemoClient, NodeId, NodeInfo,
    NodeLauncher, NodeProcess, NodeSpec, NodeState, TimeError, TimeProvider, TokioTimeProvider,
};

/// Cluster lifecycle.
pub mod cluster;

/// Fixture × suite composition.
pub mod composer;

/// File-based configuration.
pub mod config;

/// Error types.
pub mod error;

/// Environment fixtures and their sessions.
pub mod fixture;

/// Node launchers.
pub mod launchers;

/// Retry policy and executor.
pub mod retry;

/// Runner and reporting.
pub mod runner;

/// Stable node selection.
pub mod selector;

/// Behavior suite contract.
pub mod suite;

/// Built-in behavior suites.
pub mod suites;

// Cluster exports
pub use cluster::{Cluster, ClusterConfig, ClusterManager, Node, TeardownReport};

// Composer exports
pub use composer::{ComposeResult, SkippedPair, TestCase, TestComposer};

// Config exports
pub use config::HarnessConfig;

// Error exports
pub use error::{
    AssertionFailure, HarnessError, HarnessResult, OperationError, SelectionError, StartupError,
    TeardownError,
};

// Fixture exports
pub use fixture::{Fixture, FixtureSession, FixtureState, Isolation};

// Launcher exports
pub use launchers::{Connector, ProcessLauncher, SimLauncher, SimLauncherConfig};

// Retry exports
pub use retry::{Backoff, RetryExecutor, RetryPolicy, RetryStats};

// Runner exports
pub use runner::{
    CaseReport, CaseStatus, HarnessRunner, OperationOutcome, OperationReport, Reporter,
    RunReport, SilentReporter, TextReporter,
};

// Selector exports
pub use selector::{StabilityStrategy, StableNodeSelector, StableNodeSet};

// Suite exports
pub use suite::{check, suite, BehaviorSuite, ClientView, Operation, SuiteRequirements};
pub use suites::{ReachabilitySuite, UserSuite};
