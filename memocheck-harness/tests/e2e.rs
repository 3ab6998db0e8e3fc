//! End-to-end runs: fixtures, suites, runner and the in-process launcher
//! together.
//!
//! Tests verify that:
//! - Reads through another node converge under retry and fail without it
//! - Assertion failures are never retried
//! - Setup failures, hangs and panics are reported per case while other
//!   cases still pass, even when a case breaks outside its operations
//! - Teardown warnings never fail a run
//! - Every cluster started is gone once the run returns

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use memocheck_harness::{
    suite, Backoff, BehaviorSuite, CaseStatus, ClusterConfig, ClusterId, Fixture, HarnessRunner,
    Isolation, Operation, OperationError, OperationOutcome, OperationReport, ReachabilitySuite,
    RetryPolicy, RunReport, SilentReporter, SimLauncher, SimLauncherConfig, StabilityStrategy,
    SuiteRequirements, UserSuite,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

fn slow_replication() -> SimLauncher {
    SimLauncher::new(
        SimLauncherConfig::default().with_replication_delay(Duration::from_millis(150)),
    )
}

fn ten_nodes(launcher: &SimLauncher, retry: RetryPolicy) -> Fixture {
    Fixture::new("ten_nodes", Arc::new(launcher.clone()))
        .with_cluster_size(10)
        .with_strategy(StabilityStrategy::ExcludeNewest(0))
        .with_retry(retry)
}

async fn run_user_suite(fixture: Fixture) -> RunReport {
    HarnessRunner::new()
        .fixture(fixture)
        .suite(Arc::new(UserSuite))
        .reporter(Arc::new(SilentReporter))
        .run()
        .await
}

fn operation<'a>(report: &'a RunReport, name: &str) -> &'a OperationReport {
    report
        .cases
        .iter()
        .flat_map(|case| &case.operations)
        .find(|op| op.name.ends_with(name))
        .unwrap()
}

/// Write through one node, read through another: the first reads miss
/// while replication is in flight, retry absorbs them.
#[tokio::test(start_paused = true)]
async fn test_read_through_other_node_converges_with_retry() {
    init_tracing();
    let launcher = slow_replication();
    let retry = RetryPolicy::eventual(3).with_backoff(Backoff::Fixed(Duration::from_millis(100)));

    let report = run_user_suite(ten_nodes(&launcher, retry)).await;

    assert!(report.is_success(), "{report}");
    assert_eq!(report.exit_code(), 0);
    let other = operation(&report, "put_then_get_other_node");
    assert_eq!(other.outcome, OperationOutcome::Passed);
    assert!(other.retries > 0);
    assert!(other.attempts <= 4, "one put plus at most three reads");
    assert_eq!(launcher.live_nodes(), 0);
    assert_eq!(launcher.cluster_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_read_through_other_node_fails_without_retry() {
    let launcher = slow_replication();

    let report = run_user_suite(ten_nodes(&launcher, RetryPolicy::disabled())).await;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.exit_code(), 1);
    let other = operation(&report, "put_then_get_other_node");
    match &other.outcome {
        OperationOutcome::Failed(failure) => {
            assert!(failure.message.contains("did not converge"), "{failure}")
        }
        outcome => panic!("expected failure, got {outcome}"),
    }
    assert_eq!(other.retries, 0);
    assert_eq!(
        operation(&report, "put_then_get_same_node").outcome,
        OperationOutcome::Passed
    );
    assert_eq!(launcher.live_nodes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_assertion_failure_not_retried() {
    let launcher = SimLauncher::default();
    let calls = Arc::new(AtomicU32::new(0));
    let counted = calls.clone();
    let wrong = suite("wrong")
        .operation("always_wrong", move |view| {
            let calls = counted.clone();
            async move {
                let calls = &*calls;
                view.retry(move |_| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(OperationError::assertion("value is wrong"))
                })
                .await
            }
            .boxed()
        })
        .build();

    let fixture = Fixture::single_node(Arc::new(launcher.clone()))
        .with_retry(RetryPolicy::eventual(5));
    let report = HarnessRunner::new()
        .fixture(fixture)
        .suite(wrong)
        .reporter(Arc::new(SilentReporter))
        .run()
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let op = operation(&report, "always_wrong");
    assert!(matches!(op.outcome, OperationOutcome::Failed(_)));
    assert_eq!(op.attempts, 1);
    assert_eq!(op.retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_setup_failure_isolated_to_its_case() {
    init_tracing();
    let broken = SimLauncher::new(SimLauncherConfig::default().with_spawn_failure(3));
    let healthy = SimLauncher::default();

    let report = HarnessRunner::new()
        .fixture(Fixture::new("broken", Arc::new(broken.clone())).with_cluster_size(5))
        .fixture(Fixture::new("healthy", Arc::new(healthy.clone())).with_cluster_size(5))
        .suite(Arc::new(ReachabilitySuite))
        .reporter(Arc::new(SilentReporter))
        .run()
        .await;

    let broken_case = report.case("broken::reachability").unwrap();
    assert_eq!(broken_case.status(), CaseStatus::SetupError);
    assert!(broken_case
        .operations
        .iter()
        .all(|op| matches!(op.outcome, OperationOutcome::SetupFailed(_))));
    assert_eq!(
        report.case("healthy::reachability").unwrap().status(),
        CaseStatus::Passed
    );
    assert_eq!(report.setup_errors(), 1);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(broken.live_nodes(), 0);
    assert_eq!(broken.cluster_count(), 0);
    assert_eq!(healthy.live_nodes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_failure_is_only_a_warning() {
    let launcher = SimLauncher::new(SimLauncherConfig::default().with_terminate_failure(0));
    let fixture = Fixture::new("sticky", Arc::new(launcher.clone()))
        .with_cluster_size(3)
        .with_isolation(Isolation::PerCase);

    let report = HarnessRunner::new()
        .fixture(fixture)
        .suite(Arc::new(ReachabilitySuite))
        .reporter(Arc::new(SilentReporter))
        .run()
        .await;

    assert_eq!(report.passed(), 1);
    assert_eq!(report.teardown_warnings().count(), 1);
    assert_eq!(report.exit_code(), 0);
    assert!(report.to_string().contains("Teardown Warnings"));
    assert_eq!(launcher.live_nodes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hung_operation_times_out() {
    let launcher = SimLauncher::default();
    let hang = suite("hang")
        .operation("sleeps_forever", |_view| {
            async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
            .boxed()
        })
        .operation("returns", |_view| async { Ok(()) }.boxed())
        .build();
    let config = ClusterConfig {
        operation_timeout: Duration::from_secs(2),
        ..ClusterConfig::local()
    };
    let fixture = Fixture::single_node(Arc::new(launcher.clone())).with_cluster_config(config);

    let report = HarnessRunner::new()
        .fixture(fixture)
        .suite(hang)
        .reporter(Arc::new(SilentReporter))
        .run()
        .await;

    let hung = operation(&report, "sleeps_forever");
    match &hung.outcome {
        OperationOutcome::Errored(reason) => assert!(reason.contains("timed out"), "{reason}"),
        outcome => panic!("expected timeout error, got {outcome}"),
    }
    assert_eq!(operation(&report, "returns").outcome, OperationOutcome::Passed);
    assert_eq!(report.errored(), 1);
    assert_eq!(launcher.live_nodes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_operation_reported_as_error() {
    let launcher = SimLauncher::default();
    let boom = suite("boom")
        .operation("panics", |view| {
            async move {
                if view.stable_nodes().len() == 1 {
                    panic!("invariant broken");
                }
                Ok(())
            }
            .boxed()
        })
        .build();

    let report = HarnessRunner::new()
        .fixture(Fixture::single_node(Arc::new(launcher.clone())))
        .suite(boom)
        .reporter(Arc::new(SilentReporter))
        .run()
        .await;

    match &operation(&report, "panics").outcome {
        OperationOutcome::Errored(reason) => {
            assert!(reason.contains("panicked: invariant broken"), "{reason}")
        }
        outcome => panic!("expected panic error, got {outcome}"),
    }
    assert_eq!(launcher.live_nodes(), 0);
}

/// Suite that breaks while listing its operations.
struct BrokenSuite;

impl BehaviorSuite for BrokenSuite {
    fn name(&self) -> &str {
        "broken"
    }

    fn operations(&self) -> Vec<Operation> {
        panic!("cannot list operations")
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_case_still_reported() {
    init_tracing();
    let launcher = SimLauncher::default();

    let report = HarnessRunner::new()
        .fixture(Fixture::single_node(Arc::new(launcher.clone())))
        .suite(Arc::new(BrokenSuite))
        .suite(Arc::new(ReachabilitySuite))
        .reporter(Arc::new(SilentReporter))
        .run()
        .await;

    assert_eq!(report.cases.len(), 2);
    assert_eq!(report.errored(), 1);
    assert_eq!(report.passed(), 1);
    assert_eq!(report.exit_code(), 1);

    let broken = &report.cases[0];
    assert_eq!(broken.name, "single_known_stable_node::broken");
    assert_eq!(broken.status(), CaseStatus::Errored);
    match &broken.operations[0].outcome {
        OperationOutcome::Errored(reason) => {
            assert!(reason.contains("panicked: cannot list operations"), "{reason}")
        }
        outcome => panic!("expected panic error, got {outcome}"),
    }
    assert_eq!(launcher.live_nodes(), 0);
}

fn cluster_recorder(seen: Arc<Mutex<Vec<ClusterId>>>) -> Arc<dyn BehaviorSuite> {
    let first = seen.clone();
    suite("recorder")
        .operation("first", move |view| {
            first.lock().unwrap().push(view.cluster_id());
            async { Ok(()) }.boxed()
        })
        .operation("second", move |view| {
            seen.lock().unwrap().push(view.cluster_id());
            async { Ok(()) }.boxed()
        })
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_isolation_controls_cluster_sharing() {
    for (isolation, distinct) in [(Isolation::PerOperation, 2), (Isolation::PerCase, 1)] {
        let launcher = SimLauncher::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let fixture = Fixture::new("isolation", Arc::new(launcher.clone()))
            .with_cluster_size(2)
            .with_isolation(isolation);

        let report = HarnessRunner::new()
            .fixture(fixture)
            .suite(cluster_recorder(seen.clone()))
            .reporter(Arc::new(SilentReporter))
            .run()
            .await;
        assert!(report.is_success());

        let mut ids = seen.lock().unwrap().clone();
        assert_eq!(ids.len(), 2);
        ids.dedup();
        assert_eq!(ids.len(), distinct, "{isolation}");
        assert_eq!(launcher.live_nodes(), 0);
    }
}

/// A node that never catches up breaks convergence unless the strategy
/// leaves it out of the stable set.
#[tokio::test(start_paused = true)]
async fn test_exclude_newest_hides_lagging_node() {
    let launcher = SimLauncher::new(SimLauncherConfig::default().with_lagging_node(3));
    let fixture = |strategy: StabilityStrategy| {
        Fixture::new(format!("lagging_{strategy}"), Arc::new(launcher.clone()))
            .with_cluster_size(4)
            .with_strategy(strategy)
            .with_retry(RetryPolicy::eventual(3))
    };

    let report = HarnessRunner::new()
        .fixture(fixture(StabilityStrategy::AllNodes))
        .fixture(fixture(StabilityStrategy::ExcludeNewest(1)))
        .suite(Arc::new(UserSuite))
        .reporter(Arc::new(SilentReporter))
        .run()
        .await;

    assert_eq!(
        report.cases[0].status(),
        CaseStatus::Failed,
        "lagging node in the stable set"
    );
    assert_eq!(report.cases[1].status(), CaseStatus::Passed);
    assert_eq!(launcher.live_nodes(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_cases_stay_isolated() {
    let launcher = SimLauncher::new(SimLauncherConfig::instant());
    let fixtures = (0..4).map(|i| {
        Fixture::new(format!("parallel_{i}"), Arc::new(launcher.clone()))
            .with_cluster_size(3)
            .with_cluster_config(ClusterConfig::local())
    });

    let report = HarnessRunner::new()
        .fixtures(fixtures)
        .suite(Arc::new(UserSuite))
        .suite(Arc::new(ReachabilitySuite))
        .parallelism(4)
        .reporter(Arc::new(SilentReporter))
        .run()
        .await;

    assert_eq!(report.cases.len(), 8);
    assert!(report.is_success(), "{report}");
    assert_eq!(launcher.live_nodes(), 0);
    assert_eq!(launcher.cluster_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_requirements_gate_whole_run() {
    let launcher = SimLauncher::default();
    let big = suite("big")
        .requirements(SuiteRequirements::stable_nodes(5))
        .operation("noop", |_view| async { Ok(()) }.boxed())
        .build();

    let report = HarnessRunner::new()
        .fixture(Fixture::single_node(Arc::new(launcher.clone())))
        .suite(big)
        .reporter(Arc::new(SilentReporter))
        .run()
        .await;

    assert!(report.cases.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(launcher.cluster_count(), 0);
}
