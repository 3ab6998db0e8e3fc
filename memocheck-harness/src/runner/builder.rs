//! Harness runner builder.
//!
//! Collects fixtures and suites, composes them into cases, runs the cases
//! (optionally several at once) and reports.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::instrument;

use crate::composer::{panic_message, ComposeResult, TestComposer};
use crate::fixture::Fixture;
use crate::suite::BehaviorSuite;

use super::outcome::CaseReport;
use super::report::RunReport;
use super::reporter::{Reporter, SilentReporter};

/// Builder pattern for configuring and running the harness.
pub struct HarnessRunner {
    fixtures: Vec<Arc<Fixture>>,
    suites: Vec<Arc<dyn BehaviorSuite>>,
    parallelism: usize,
    filter: Option<String>,
    reverse: bool,
    reporter: Arc<dyn Reporter>,
}

impl Default for HarnessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl HarnessRunner {
    /// Create an empty runner: sequential, silent, no filter.
    pub fn new() -> Self {
        Self {
            fixtures: Vec::new(),
            suites: Vec::new(),
            parallelism: 1,
            filter: None,
            reverse: false,
            reporter: Arc::new(SilentReporter),
        }
    }

    /// Add a fixture.
    pub fn fixture(mut self, fixture: Fixture) -> Self {
        self.fixtures.push(Arc::new(fixture));
        self
    }

    /// Add several fixtures.
    pub fn fixtures(mut self, fixtures: impl IntoIterator<Item = Fixture>) -> Self {
        self.fixtures.extend(fixtures.into_iter().map(Arc::new));
        self
    }

    /// Add a suite.
    pub fn suite(mut self, suite: Arc<dyn BehaviorSuite>) -> Self {
        self.suites.push(suite);
        self
    }

    /// Add several suites.
    pub fn suites(mut self, suites: impl IntoIterator<Item = Arc<dyn BehaviorSuite>>) -> Self {
        self.suites.extend(suites);
        self
    }

    /// Run up to `n` cases at once. Zero is treated as one.
    pub fn parallelism(mut self, n: usize) -> Self {
        self.parallelism = n.max(1);
        self
    }

    /// Only run cases whose name contains `pattern`.
    pub fn filter(mut self, pattern: impl Into<String>) -> Self {
        self.filter = Some(pattern.into());
        self
    }

    /// Run cases in reverse composition order.
    pub fn reverse_order(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Set the reporter.
    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Compose cases with the filter and ordering applied.
    pub fn compose(&self) -> ComposeResult {
        let mut composed = TestComposer::compose(&self.fixtures, &self.suites);
        if let Some(pattern) = &self.filter {
            composed.cases.retain(|case| case.name().contains(pattern.as_str()));
        }
        if self.reverse {
            composed.cases.reverse();
        }
        composed
    }

    /// Run every composed case and return the report.
    #[instrument(skip_all, fields(parallelism = self.parallelism))]
    pub async fn run(self) -> RunReport {
        let started = Instant::now();
        let ComposeResult { cases, skipped } = self.compose();
        tracing::info!(
            "Running {} case(s) with parallelism {}",
            cases.len(),
            self.parallelism
        );
        self.reporter.run_started(cases.len(), &skipped);

        let names: Vec<String> = cases.iter().map(|case| case.name().to_string()).collect();
        let permits = Arc::new(Semaphore::new(self.parallelism));
        let mut tasks = JoinSet::new();
        for (position, case) in cases.into_iter().enumerate() {
            let permits = permits.clone();
            let reporter = self.reporter.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let report = match AssertUnwindSafe(case.run()).catch_unwind().await {
                    Ok(report) => report,
                    Err(panic) => {
                        let reason = format!("panicked: {}", panic_message(panic.as_ref()));
                        tracing::error!("Case {} {}", case.name(), reason);
                        CaseReport::crashed(case.name(), reason)
                    }
                };
                reporter.case_finished(&report);
                (position, report)
            });
        }

        let mut slots: Vec<Option<CaseReport>> = vec![None; names.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, report)) => slots[position] = Some(report),
                Err(err) => tracing::error!("Case task failed: {}", err),
            }
        }

        // A slot left empty belongs to a task that never reported back.
        let cases = slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| {
                slot.unwrap_or_else(|| CaseReport::crashed(name, "case task did not complete"))
            })
            .collect();

        let report = RunReport {
            cases,
            skipped,
            wall_time: started.elapsed(),
        };
        tracing::info!(
            "Run finished: {} passed, {} failed, {} errored, {} setup errors",
            report.passed(),
            report.failed(),
            report.errored(),
            report.setup_errors()
        );
        self.reporter.run_finished(&report);
        report
    }
}
