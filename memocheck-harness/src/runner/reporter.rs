//! Reporter seam.
//!
//! The runner only emits signals; what a reporter does with them is its own
//! business. [`TextReporter`] is the plain-text default.

use std::io::Write;
use std::sync::Mutex;

use crate::composer::SkippedPair;

use super::outcome::CaseReport;
use super::report::RunReport;

/// Receives run progress. Called from concurrently running cases.
pub trait Reporter: Send + Sync {
    /// Called once after composition.
    fn run_started(&self, _cases: usize, _skipped: &[SkippedPair]) {}

    /// Called as each case finishes, in completion order.
    fn case_finished(&self, case: &CaseReport);

    /// Called once with the final report.
    fn run_finished(&self, _report: &RunReport) {}
}

/// Reporter that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn case_finished(&self, _case: &CaseReport) {}
}

/// Plain-text progress reporter.
///
/// Verbosity 0 prints nothing per case, 1 prints one marker per case
/// (`.`, `F`, `E`, `s`), 2 prints one line per operation.
pub struct TextReporter {
    verbosity: u8,
    out: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for TextReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextReporter")
            .field("verbosity", &self.verbosity)
            .finish()
    }
}

impl TextReporter {
    /// Reporter writing to stderr.
    pub fn new(verbosity: u8) -> Self {
        Self::with_writer(verbosity, Box::new(std::io::stderr()))
    }

    /// Reporter writing to `out`.
    pub fn with_writer(verbosity: u8, out: Box<dyn Write + Send>) -> Self {
        Self {
            verbosity,
            out: Mutex::new(out),
        }
    }

    fn write(&self, f: impl FnOnce(&mut dyn Write) -> std::io::Result<()>) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = f(out.as_mut()).and_then(|()| out.flush());
    }
}

impl Reporter for TextReporter {
    fn run_started(&self, cases: usize, skipped: &[SkippedPair]) {
        if self.verbosity == 0 {
            return;
        }
        self.write(|w| {
            writeln!(w, "running {} case(s), {} skipped", cases, skipped.len())?;
            if self.verbosity >= 2 {
                for s in skipped {
                    writeln!(w, "  {s}")?;
                }
            }
            Ok(())
        });
    }

    fn case_finished(&self, case: &CaseReport) {
        match self.verbosity {
            0 => {}
            1 => self.write(|w| write!(w, "{}", case.status().marker())),
            _ => self.write(|w| {
                for op in &case.operations {
                    write!(w, "{} ... {}", op.name, op.outcome)?;
                    if op.retries > 0 {
                        write!(w, " ({} retries)", op.retries)?;
                    }
                    writeln!(w)?;
                }
                for warning in &case.teardown.errors {
                    writeln!(w, "  warning: {warning}")?;
                }
                Ok(())
            }),
        }
    }

    fn run_finished(&self, _report: &RunReport) {
        if self.verbosity == 1 {
            self.write(|w| writeln!(w));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::cluster::TeardownReport;
    use crate::runner::{OperationOutcome, OperationReport};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn case() -> CaseReport {
        let op = |name: &str, outcome| OperationReport {
            name: name.to_string(),
            outcome,
            attempts: 2,
            retries: 1,
            duration: Duration::ZERO,
        };
        CaseReport {
            name: "f::s".to_string(),
            operations: vec![
                op("f::s::a", OperationOutcome::Passed),
                op("f::s::b", OperationOutcome::Errored("boom".into())),
            ],
            teardown: TeardownReport::default(),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_markers_at_verbosity_one() {
        let buf = SharedBuf::default();
        let reporter = TextReporter::with_writer(1, Box::new(buf.clone()));
        reporter.case_finished(&case());
        reporter.case_finished(&CaseReport {
            operations: Vec::new(),
            ..case()
        });
        assert_eq!(buf.contents(), "E.");
    }

    #[test]
    fn test_lines_at_verbosity_two() {
        let buf = SharedBuf::default();
        let reporter = TextReporter::with_writer(2, Box::new(buf.clone()));
        reporter.case_finished(&case());
        let out = buf.contents();
        assert!(out.contains("f::s::a ... ok (1 retries)"));
        assert!(out.contains("f::s::b ... ERROR: boom"));
    }

    #[test]
    fn test_quiet_at_verbosity_zero() {
        let buf = SharedBuf::default();
        let reporter = TextReporter::with_writer(0, Box::new(buf.clone()));
        reporter.run_started(1, &[]);
        reporter.case_finished(&case());
        assert!(buf.contents().is_empty());
    }
}
