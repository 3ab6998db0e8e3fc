//! Error kinds of the orchestration engine.
//!
//! The split matters for reporting: startup and selection errors are setup
//! problems, assertion failures are product bugs, transient errors are only
//! failures once retries run out, and teardown errors are warnings.

use std::fmt;
use std::time::Duration;

use memocheck_core::{ClientError, LaunchError, NodeId};
use thiserror::Error;

use crate::fixture::FixtureState;
use crate::selector::StabilityStrategy;

/// A cluster could not be brought up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartupError {
    /// Cluster size must be at least 1.
    #[error("cannot start a cluster of {requested} nodes")]
    InvalidSize {
        /// Requested size.
        requested: usize,
    },

    /// The launcher failed to spawn a node.
    #[error("node {index} failed to spawn: {source}")]
    Spawn {
        /// Spawn index of the node.
        index: u32,
        /// Launcher error.
        source: LaunchError,
    },

    /// A node reported it will never become ready.
    #[error("node {index} failed during startup: {source}")]
    NotReady {
        /// Spawn index of the node.
        index: u32,
        /// Launcher error.
        source: LaunchError,
    },

    /// A node did not report ready within the readiness timeout.
    #[error("node {index} not ready after {timeout:?}")]
    ReadyTimeout {
        /// Spawn index of the node.
        index: u32,
        /// Configured readiness timeout.
        timeout: Duration,
    },

    /// The cluster as a whole did not come up within the start timeout.
    #[error("cluster start exceeded {timeout:?} (node {index} still pending)")]
    Timeout {
        /// First node still pending when the deadline passed.
        index: u32,
        /// Configured start timeout.
        timeout: Duration,
    },

    /// Two nodes of the same cluster were given the same address.
    #[error("address {address} handed out twice")]
    DuplicateAddress {
        /// The duplicated address.
        address: String,
    },
}

/// A stability strategy cannot be satisfied by a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// Not enough ready nodes for the strategy.
    #[error("strategy {strategy} needs {required} ready node(s), cluster has {available}")]
    InsufficientNodes {
        /// The strategy that was requested.
        strategy: StabilityStrategy,
        /// Ready nodes the strategy needs.
        required: usize,
        /// Ready nodes the cluster has.
        available: usize,
    },
}

/// An expectation of a behavior suite was violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionFailure {
    /// What was being checked.
    pub message: String,
    /// Expected value, rendered for the report.
    pub expected: Option<String>,
    /// Observed value, rendered for the report.
    pub actual: Option<String>,
}

impl AssertionFailure {
    /// Failure with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    /// Failure carrying expected and actual values.
    pub fn mismatch(
        message: impl Into<String>,
        expected: impl fmt::Debug,
        actual: impl fmt::Debug,
    ) -> Self {
        Self {
            message: message.into(),
            expected: Some(format!("{expected:?}")),
            actual: Some(format!("{actual:?}")),
        }
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let (Some(expected), Some(actual)) = (&self.expected, &self.actual) {
            write!(f, " (expected {expected}, got {actual})")?;
        }
        Ok(())
    }
}

/// Failure of a single behavior-suite operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The system has not converged yet. Eligible for retry.
    #[error("transient: {0}")]
    Transient(String),

    /// A genuine expectation mismatch. Never retried.
    #[error("assertion failed: {0}")]
    Assertion(AssertionFailure),

    /// Anything else (protocol errors, timeouts, panics). Never retried.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl OperationError {
    /// Build a transient error.
    pub fn transient(reason: impl Into<String>) -> Self {
        OperationError::Transient(reason.into())
    }

    /// Build an assertion failure from a message.
    pub fn assertion(message: impl Into<String>) -> Self {
        OperationError::Assertion(AssertionFailure::new(message))
    }

    /// Build an unexpected error.
    pub fn unexpected(reason: impl Into<String>) -> Self {
        OperationError::Unexpected(reason.into())
    }

    /// Whether the retry executor may try again after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, OperationError::Transient(_))
    }
}

impl From<AssertionFailure> for OperationError {
    fn from(failure: AssertionFailure) -> Self {
        OperationError::Assertion(failure)
    }
}

impl From<ClientError> for OperationError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Unavailable(reason) => OperationError::Transient(reason),
            other => OperationError::Unexpected(other.to_string()),
        }
    }
}

/// A node failed to terminate cleanly. Reported as a warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("node {node} ({address}) did not stop cleanly: {reason}")]
pub struct TeardownError {
    /// Node that failed to stop.
    pub node: NodeId,
    /// Its address.
    pub address: String,
    /// Why.
    pub reason: String,
}

/// Umbrella error for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    /// Cluster startup failed.
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// Stable-node selection failed.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// An operation failed.
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A fixture session was driven out of order.
    #[error("illegal fixture transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// State the session was in.
        from: FixtureState,
        /// State it was asked to enter.
        to: FixtureState,
    },
}

/// A type alias for `Result<T, HarnessError>`.
pub type HarnessResult<T> = Result<T, HarnessError>;
