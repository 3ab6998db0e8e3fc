//! Fixture × suite composition.
//!
//! Every fixture is paired with every suite whose requirements it satisfies.
//! The resulting [`TestCase`]s share only `Arc`s to the fixture definition and
//! the suite, so each one can run on its own, in any order, in parallel.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::instrument;

use crate::cluster::TeardownReport;
use crate::error::OperationError;
use crate::fixture::{Fixture, FixtureSession, Isolation};
use crate::runner::{CaseReport, OperationOutcome, OperationReport};
use crate::suite::{BehaviorSuite, Operation};

/// A (fixture, suite) pair left out of composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPair {
    /// Fixture name.
    pub fixture: String,
    /// Suite name.
    pub suite: String,
    /// Unmet requirement.
    pub reason: String,
}

impl fmt::Display for SkippedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} skipped: {}", self.fixture, self.suite, self.reason)
    }
}

/// Output of [`TestComposer::compose`].
#[derive(Debug, Default)]
pub struct ComposeResult {
    /// Runnable cases, fixture-major.
    pub cases: Vec<TestCase>,
    /// Pairs excluded by requirements.
    pub skipped: Vec<SkippedPair>,
}

/// Builds test cases from fixtures and suites.
pub struct TestComposer;

impl TestComposer {
    /// Cross product of `fixtures` and `suites`, filtered by requirements.
    pub fn compose(
        fixtures: &[Arc<Fixture>],
        suites: &[Arc<dyn BehaviorSuite>],
    ) -> ComposeResult {
        let mut result = ComposeResult::default();
        for fixture in fixtures {
            for suite in suites {
                match unmet_requirement(fixture, suite.as_ref()) {
                    None => result.cases.push(TestCase::new(fixture.clone(), suite.clone())),
                    Some(reason) => {
                        let skipped = SkippedPair {
                            fixture: fixture.name().to_string(),
                            suite: suite.name().to_string(),
                            reason,
                        };
                        tracing::info!("{}", skipped);
                        result.skipped.push(skipped);
                    }
                }
            }
        }
        tracing::debug!(
            "Composed {} case(s), skipped {}",
            result.cases.len(),
            result.skipped.len()
        );
        result
    }
}

fn unmet_requirement(fixture: &Fixture, suite: &dyn BehaviorSuite) -> Option<String> {
    let req = suite.requirements();
    if fixture.cluster_size() < req.min_cluster_size {
        return Some(format!(
            "needs {} node(s), fixture starts {}",
            req.min_cluster_size,
            fixture.cluster_size()
        ));
    }
    match fixture.guaranteed_stable_nodes() {
        None => {
            return Some(format!(
                "strategy {} cannot be satisfied by {} node(s)",
                fixture.strategy(),
                fixture.cluster_size()
            ))
        }
        Some(stable) if stable < req.min_stable_nodes => {
            return Some(format!(
                "needs {} stable node(s), strategy {} yields {}",
                req.min_stable_nodes,
                fixture.strategy(),
                stable
            ))
        }
        Some(_) => {}
    }
    if req.needs_client && !fixture.launcher().supports_clients() {
        return Some(format!(
            "needs memo clients, launcher '{}' provides none",
            fixture.launcher().name()
        ));
    }
    None
}

/// One fixture paired with one suite.
#[derive(Clone)]
pub struct TestCase {
    name: String,
    fixture: Arc<Fixture>,
    suite: Arc<dyn BehaviorSuite>,
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase").field("name", &self.name).finish()
    }
}

impl TestCase {
    /// Pair `fixture` with `suite` without checking requirements.
    pub fn new(fixture: Arc<Fixture>, suite: Arc<dyn BehaviorSuite>) -> Self {
        let name = format!("{}::{}", fixture.name(), suite.name());
        Self {
            name,
            fixture,
            suite,
        }
    }

    /// Case name, `fixture::suite`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fixture.
    pub fn fixture(&self) -> &Arc<Fixture> {
        &self.fixture
    }

    /// The suite.
    pub fn suite(&self) -> &Arc<dyn BehaviorSuite> {
        &self.suite
    }

    /// Run every operation of the suite against fresh fixture sessions.
    ///
    /// Never fails: setup problems, assertion failures, errors, timeouts and
    /// panics all end up in the report, and every cluster started is stopped.
    #[instrument(skip_all, fields(case = %self.name))]
    pub async fn run(&self) -> CaseReport {
        let started = Instant::now();
        let operations = self.suite.operations();
        let mut reports = Vec::with_capacity(operations.len());
        let mut teardown = TeardownReport::default();

        match self.fixture.isolation() {
            Isolation::PerOperation => {
                for op in &operations {
                    let mut session = FixtureSession::new(self.fixture.clone());
                    let report = match session.setup().await {
                        Ok(()) => self.run_operation(&mut session, op).await,
                        Err(err) => self.setup_failed(op, &err.to_string()),
                    };
                    teardown.merge(session.teardown().await);
                    reports.push(report);
                }
            }
            Isolation::PerCase => {
                let mut session = FixtureSession::new(self.fixture.clone());
                match session.setup().await {
                    Ok(()) => {
                        for op in &operations {
                            reports.push(self.run_operation(&mut session, op).await);
                        }
                    }
                    Err(err) => {
                        let reason = err.to_string();
                        reports.extend(operations.iter().map(|op| self.setup_failed(op, &reason)));
                    }
                }
                teardown.merge(session.teardown().await);
            }
        }

        let report = CaseReport {
            name: self.name.clone(),
            operations: reports,
            teardown,
            duration: started.elapsed(),
        };
        tracing::info!("Case {} {}", self.name, report.status());
        report
    }

    fn operation_name(&self, op: &Operation) -> String {
        format!("{}::{}", self.name, op.name())
    }

    fn setup_failed(&self, op: &Operation, reason: &str) -> OperationReport {
        tracing::warn!("Setup failed for {}: {}", self.operation_name(op), reason);
        OperationReport {
            name: self.operation_name(op),
            outcome: OperationOutcome::SetupFailed(reason.to_string()),
            attempts: 0,
            retries: 0,
            duration: Default::default(),
        }
    }

    async fn run_operation(&self, session: &mut FixtureSession, op: &Operation) -> OperationReport {
        let name = self.operation_name(op);
        let view = match session.view() {
            Ok(view) => view,
            Err(err) => return self.setup_failed(op, &err.to_string()),
        };

        let limit = self.fixture.cluster_config().operation_timeout;
        let started = Instant::now();
        let guarded = AssertUnwindSafe(op.run(&view)).catch_unwind();
        let result = match tokio::time::timeout(limit, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(OperationError::unexpected(format!(
                "panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(OperationError::unexpected(format!(
                "timed out after {limit:?}"
            ))),
        };
        let duration = started.elapsed();

        let outcome = OperationOutcome::from(result);
        match &outcome {
            OperationOutcome::Passed => tracing::debug!("{} passed", name),
            other => tracing::warn!("{} {}", name, other),
        }

        let stats = view.executor().stats();
        OperationReport {
            name,
            outcome,
            attempts: stats.attempts(),
            retries: stats.retries(),
            duration,
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
