//! Integration tests for fixture sessions.
//!
//! A session moves through a fixed lifecycle and owns its cluster: these
//! tests check the recorded state history and that no exit path leaves
//! nodes running.

use std::sync::Arc;

use memocheck_harness::{
    Fixture, FixtureSession, FixtureState, HarnessError, SelectionError, SimLauncher,
    SimLauncherConfig, StabilityStrategy, StartupError,
};

use FixtureState::*;

fn fixture(launcher: &SimLauncher, nodes: usize) -> Arc<Fixture> {
    Arc::new(Fixture::new("sessions", Arc::new(launcher.clone())).with_cluster_size(nodes))
}

#[tokio::test(start_paused = true)]
async fn test_session_lifecycle_history() {
    let launcher = SimLauncher::default();
    let mut session = FixtureSession::new(fixture(&launcher, 3));
    assert_eq!(session.state(), Uninitialized);

    session.setup().await.unwrap();
    assert_eq!(session.state(), StableSetSelected);
    assert_eq!(session.cluster().map(|c| c.size()), Some(3));
    assert_eq!(session.stable_nodes().map(|s| s.len()), Some(3));

    let first = session.view().unwrap();
    let second = session.view().unwrap();
    assert_eq!(first.cluster_id(), second.cluster_id());
    assert_eq!(session.state(), Running);

    let report = session.teardown().await;
    assert_eq!(report.stopped, 3);
    assert!(session.cluster().is_none());
    assert_eq!(launcher.live_nodes(), 0);

    assert_eq!(
        session.history(),
        &[
            Uninitialized,
            ClusterStarting,
            ClusterReady,
            StableSetSelected,
            Running,
            Running,
            TearingDown,
            Closed,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_startup_failure_closes_session() {
    let launcher = SimLauncher::new(SimLauncherConfig::default().with_spawn_failure(1));
    let mut session = FixtureSession::new(fixture(&launcher, 4));

    let err = session.setup().await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Startup(StartupError::Spawn { index: 1, .. })
    ));
    assert_eq!(session.state(), Closed);
    assert_eq!(
        session.history(),
        &[Uninitialized, ClusterStarting, TearingDown, Closed]
    );
    assert_eq!(launcher.live_nodes(), 0);
    assert_eq!(launcher.cluster_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_selection_failure_stops_started_cluster() {
    let launcher = SimLauncher::default();
    let fixture = Fixture::new("too_small", Arc::new(launcher.clone()))
        .with_cluster_size(2)
        .with_strategy(StabilityStrategy::ExcludeNewest(2));
    let mut session = FixtureSession::new(Arc::new(fixture));

    let err = session.setup().await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Selection(SelectionError::InsufficientNodes { required: 3, .. })
    ));
    assert_eq!(
        session.history(),
        &[Uninitialized, ClusterStarting, ClusterReady, TearingDown, Closed]
    );
    assert_eq!(launcher.live_nodes(), 0);

    let report = session.teardown().await;
    assert_eq!(report.stopped, 2, "stop report kept for teardown");
}

#[tokio::test]
async fn test_view_before_setup_is_illegal() {
    let launcher = SimLauncher::default();
    let mut session = FixtureSession::new(fixture(&launcher, 1));

    let err = session.view().unwrap_err();
    assert_eq!(
        err,
        HarnessError::IllegalTransition {
            from: Uninitialized,
            to: Running,
        }
    );
    assert_eq!(session.state(), Uninitialized);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_twice_is_noop() {
    let launcher = SimLauncher::default();
    let mut session = FixtureSession::new(fixture(&launcher, 2));
    session.setup().await.unwrap();

    assert_eq!(session.teardown().await.stopped, 2);
    let again = session.teardown().await;
    assert_eq!(again.stopped, 0);
    assert!(again.is_clean());
    assert_eq!(session.state(), Closed);
}

#[tokio::test(start_paused = true)]
async fn test_closed_session_cannot_restart() {
    let launcher = SimLauncher::default();
    let mut session = FixtureSession::new(fixture(&launcher, 1));
    session.setup().await.unwrap();
    session.teardown().await;

    let err = session.setup().await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::IllegalTransition {
            from: Closed,
            to: ClusterStarting,
        }
    ));
    assert_eq!(launcher.cluster_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_without_setup() {
    let launcher = SimLauncher::default();
    let mut session = FixtureSession::new(fixture(&launcher, 1));

    let report = session.teardown().await;
    assert_eq!(report.stopped, 0);
    assert_eq!(session.history(), &[Uninitialized, TearingDown, Closed]);
}
