//! Run summary.

use std::fmt;
use std::time::Duration;

use crate::composer::SkippedPair;
use crate::error::TeardownError;

use super::outcome::{CaseReport, CaseStatus};

/// Everything a harness run produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Case reports in composition order.
    pub cases: Vec<CaseReport>,
    /// Pairs excluded by suite requirements.
    pub skipped: Vec<SkippedPair>,
    /// Wall-clock time of the run.
    pub wall_time: Duration,
}

impl RunReport {
    fn count(&self, status: CaseStatus) -> usize {
        self.cases.iter().filter(|c| c.status() == status).count()
    }

    /// Cases that passed.
    pub fn passed(&self) -> usize {
        self.count(CaseStatus::Passed)
    }

    /// Cases with at least one failed expectation.
    pub fn failed(&self) -> usize {
        self.count(CaseStatus::Failed)
    }

    /// Cases that errored.
    pub fn errored(&self) -> usize {
        self.count(CaseStatus::Errored)
    }

    /// Cases whose environment could not be set up.
    pub fn setup_errors(&self) -> usize {
        self.count(CaseStatus::SetupError)
    }

    /// Teardown problems across all cases.
    pub fn teardown_warnings(&self) -> impl Iterator<Item = &TeardownError> {
        self.cases.iter().flat_map(|c| c.teardown.errors.iter())
    }

    /// Case report by name.
    pub fn case(&self, name: &str) -> Option<&CaseReport> {
        self.cases.iter().find(|c| c.name == name)
    }

    /// Whether every case passed. Teardown warnings do not count.
    pub fn is_success(&self) -> bool {
        self.cases.iter().all(CaseReport::passed)
    }

    /// Process exit code: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Memo Harness Report ===")?;
        writeln!(f, "Cases: {}", self.cases.len())?;
        writeln!(f, "Passed: {}", self.passed())?;
        writeln!(f, "Failed: {}", self.failed())?;
        writeln!(f, "Errored: {}", self.errored())?;
        writeln!(f, "Setup errors: {}", self.setup_errors())?;
        writeln!(f, "Skipped: {}", self.skipped.len())?;
        writeln!(f, "Wall Time: {:?}", self.wall_time)?;

        let problems: Vec<_> = self.cases.iter().filter(|c| !c.passed()).collect();
        if !problems.is_empty() {
            writeln!(f)?;
            writeln!(f, "=== Problems ===")?;
            for case in problems {
                for op in case.operations.iter().filter(|op| !op.outcome.is_pass()) {
                    writeln!(f, "  - {}: {}", op.name, op.outcome)?;
                }
            }
        }

        let warnings: Vec<_> = self.teardown_warnings().collect();
        if !warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "=== Teardown Warnings ===")?;
            for w in warnings {
                writeln!(f, "  - {}", w)?;
            }
        }

        if !self.skipped.is_empty() {
            writeln!(f)?;
            writeln!(f, "=== Skipped ===")?;
            for s in &self.skipped {
                writeln!(f, "  - {}", s)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use memocheck_core::{ClusterId, NodeId};

    use super::*;
    use crate::cluster::TeardownReport;
    use crate::runner::{OperationOutcome, OperationReport};

    fn case(name: &str, outcome: OperationOutcome, teardown: TeardownReport) -> CaseReport {
        CaseReport {
            name: name.to_string(),
            operations: vec![OperationReport {
                name: format!("{name}::op"),
                outcome,
                attempts: 1,
                retries: 0,
                duration: Duration::ZERO,
            }],
            teardown,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_teardown_warning_keeps_exit_code_zero() {
        let warning = TeardownError {
            node: NodeId::new(ClusterId::new(1), 0),
            address: "sim://1/0".to_string(),
            reason: "refused to die".to_string(),
        };
        let report = RunReport {
            cases: vec![case(
                "f::s",
                OperationOutcome::Passed,
                TeardownReport {
                    stopped: 0,
                    errors: vec![warning],
                },
            )],
            ..Default::default()
        };
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.teardown_warnings().count(), 1);
        assert!(report.to_string().contains("Teardown Warnings"));
    }

    #[test]
    fn test_setup_error_fails_run() {
        let report = RunReport {
            cases: vec![
                case("a::s", OperationOutcome::Passed, TeardownReport::default()),
                case(
                    "b::s",
                    OperationOutcome::SetupFailed("node 3 failed to spawn".into()),
                    TeardownReport::default(),
                ),
            ],
            ..Default::default()
        };
        assert_eq!(report.passed(), 1);
        assert_eq!(report.setup_errors(), 1);
        assert_eq!(report.exit_code(), 1);
        assert!(report.to_string().contains("b::s::op: SETUP ERROR"));
    }
}
