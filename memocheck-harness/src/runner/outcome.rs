//! Per-operation and per-case outcomes.

use std::fmt;
use std::time::Duration;

use crate::cluster::TeardownReport;
use crate::error::{AssertionFailure, OperationError};

/// Result of running one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Every expectation held.
    Passed,
    /// An expectation was violated, or a transient failure outlived the
    /// retry budget.
    Failed(AssertionFailure),
    /// The operation broke for a reason unrelated to the behavior under test.
    Errored(String),
    /// The environment could not be set up; the operation never ran.
    SetupFailed(String),
}

impl OperationOutcome {
    /// Whether the operation passed.
    pub fn is_pass(&self) -> bool {
        matches!(self, OperationOutcome::Passed)
    }
}

impl From<Result<(), OperationError>> for OperationOutcome {
    fn from(result: Result<(), OperationError>) -> Self {
        match result {
            Ok(()) => OperationOutcome::Passed,
            Err(OperationError::Assertion(failure)) => OperationOutcome::Failed(failure),
            Err(OperationError::Transient(reason)) => OperationOutcome::Failed(
                AssertionFailure::new(format!("did not converge: {reason}")),
            ),
            Err(OperationError::Unexpected(reason)) => OperationOutcome::Errored(reason),
        }
    }
}

impl fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationOutcome::Passed => f.write_str("ok"),
            OperationOutcome::Failed(failure) => write!(f, "FAILED: {failure}"),
            OperationOutcome::Errored(reason) => write!(f, "ERROR: {reason}"),
            OperationOutcome::SetupFailed(reason) => write!(f, "SETUP ERROR: {reason}"),
        }
    }
}

/// Report of one operation within a case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    /// Full name, `fixture::suite::operation`.
    pub name: String,
    /// What happened.
    pub outcome: OperationOutcome,
    /// Attempts made through the retry executor.
    pub attempts: u32,
    /// Transient failures absorbed by retrying.
    pub retries: u32,
    /// Time spent in the operation body.
    pub duration: Duration,
}

/// Overall status of a test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseStatus {
    /// Every operation passed.
    Passed,
    /// At least one operation failed an expectation.
    Failed,
    /// At least one operation errored, none failed.
    Errored,
    /// The environment could not be set up for some operation.
    SetupError,
}

impl CaseStatus {
    /// One-character marker for compact progress output.
    pub fn marker(&self) -> char {
        match self {
            CaseStatus::Passed => '.',
            CaseStatus::Failed => 'F',
            CaseStatus::Errored => 'E',
            CaseStatus::SetupError => 's',
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseStatus::Passed => f.write_str("passed"),
            CaseStatus::Failed => f.write_str("failed"),
            CaseStatus::Errored => f.write_str("errored"),
            CaseStatus::SetupError => f.write_str("setup error"),
        }
    }
}

/// Report of one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseReport {
    /// Case name, `fixture::suite`.
    pub name: String,
    /// Operation reports in execution order.
    pub operations: Vec<OperationReport>,
    /// Nodes that did not stop cleanly. Warnings only.
    pub teardown: TeardownReport,
    /// Wall time of the whole case, setup and teardown included.
    pub duration: Duration,
}

impl CaseReport {
    /// Report for a case that broke down outside any single operation.
    /// Carries one errored entry named after the case so it never reads as
    /// passed.
    pub fn crashed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            operations: vec![OperationReport {
                name: name.clone(),
                outcome: OperationOutcome::Errored(reason.into()),
                attempts: 0,
                retries: 0,
                duration: Duration::ZERO,
            }],
            name,
            teardown: TeardownReport::default(),
            duration: Duration::ZERO,
        }
    }

    /// Overall status. Failures outrank errors, which outrank setup errors.
    pub fn status(&self) -> CaseStatus {
        let outcomes = || self.operations.iter().map(|op| &op.outcome);
        if outcomes().any(|o| matches!(o, OperationOutcome::Failed(_))) {
            CaseStatus::Failed
        } else if outcomes().any(|o| matches!(o, OperationOutcome::Errored(_))) {
            CaseStatus::Errored
        } else if outcomes().any(|o| matches!(o, OperationOutcome::SetupFailed(_))) {
            CaseStatus::SetupError
        } else {
            CaseStatus::Passed
        }
    }

    /// Whether the case passed.
    pub fn passed(&self) -> bool {
        self.status() == CaseStatus::Passed
    }

    /// Operation outcomes only, for comparing runs.
    pub fn outcomes(&self) -> Vec<(String, OperationOutcome)> {
        self.operations
            .iter()
            .map(|op| (op.name.clone(), op.outcome.clone()))
            .collect()
    }
}
