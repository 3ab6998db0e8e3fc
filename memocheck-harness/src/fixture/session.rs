//! Fixture session lifecycle.
//!
//! ```text
//! Uninitialized ─► ClusterStarting ─► ClusterReady ─► StableSetSelected ─► Running ─┐
//!       │                 │                 │                  │              ▲     │
//!       │                 │                 │                  │              └─────┤
//!       └─────────────────┴─────────────────┴──────────────────┴──► TearingDown ◄───┘
//!                                                                         │
//!                                                                         ▼
//!                                                                      Closed
//! ```
//!
//! Startup and selection failures go straight to `TearingDown` and `Closed`;
//! the originating error is returned from [`FixtureSession::setup`].

use std::sync::Arc;

use tracing::instrument;

use crate::cluster::{Cluster, ClusterManager, TeardownReport};
use crate::error::{HarnessError, HarnessResult};
use crate::retry::RetryExecutor;
use crate::selector::{StableNodeSelector, StableNodeSet};
use crate::suite::ClientView;

use super::Fixture;

/// Lifecycle state of a [`FixtureSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureState {
    /// Nothing started yet.
    Uninitialized,
    /// Cluster start in progress.
    ClusterStarting,
    /// All nodes ready, no stable set yet.
    ClusterReady,
    /// Stable set selected.
    StableSetSelected,
    /// Operations are being handed views.
    Running,
    /// Cluster being stopped.
    TearingDown,
    /// Terminal.
    Closed,
}

impl FixtureState {
    fn can_enter(self, next: FixtureState) -> bool {
        use FixtureState::*;
        matches!(
            (self, next),
            (Uninitialized, ClusterStarting)
                | (ClusterStarting, ClusterReady)
                | (ClusterReady, StableSetSelected)
                | (StableSetSelected, Running)
                | (Running, Running)
                | (TearingDown, Closed)
        ) || (next == TearingDown && !matches!(self, TearingDown | Closed))
    }
}

/// One execution of a [`Fixture`]: owns the cluster for its lifetime.
pub struct FixtureSession {
    fixture: Arc<Fixture>,
    manager: ClusterManager,
    state: FixtureState,
    history: Vec<FixtureState>,
    cluster: Option<Cluster>,
    stable: Option<StableNodeSet>,
    teardown: TeardownReport,
}

impl std::fmt::Debug for FixtureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureSession")
            .field("fixture", &self.fixture.name())
            .field("state", &self.state)
            .field("cluster", &self.cluster.as_ref().map(|c| c.id()))
            .finish()
    }
}

impl FixtureSession {
    /// Create an uninitialized session.
    pub fn new(fixture: Arc<Fixture>) -> Self {
        let manager = fixture.manager();
        Self {
            fixture,
            manager,
            state: FixtureState::Uninitialized,
            history: vec![FixtureState::Uninitialized],
            cluster: None,
            stable: None,
            teardown: TeardownReport::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> FixtureState {
        self.state
    }

    /// Every state entered so far, starting with `Uninitialized`.
    pub fn history(&self) -> &[FixtureState] {
        &self.history
    }

    /// The running cluster, between a successful setup and teardown.
    pub fn cluster(&self) -> Option<&Cluster> {
        self.cluster.as_ref()
    }

    /// The selected stable set, once selected.
    pub fn stable_nodes(&self) -> Option<&StableNodeSet> {
        self.stable.as_ref()
    }

    fn transition(&mut self, next: FixtureState) -> HarnessResult<()> {
        if !self.state.can_enter(next) {
            return Err(HarnessError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(
            "Fixture {} session: {:?} -> {:?}",
            self.fixture.name(),
            self.state,
            next
        );
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Start the cluster and select the stable nodes.
    ///
    /// On failure the session is already closed, with any partially started
    /// cluster stopped, and the originating error is returned.
    #[instrument(skip_all, fields(fixture = self.fixture.name()))]
    pub async fn setup(&mut self) -> HarnessResult<()> {
        self.transition(FixtureState::ClusterStarting)?;

        let cluster = match self.manager.start(self.fixture.cluster_size()).await {
            Ok(cluster) => cluster,
            Err(err) => {
                self.close().await?;
                return Err(err.into());
            }
        };
        let selected = StableNodeSelector::select(&cluster, &self.fixture.strategy());
        self.cluster = Some(cluster);
        self.transition(FixtureState::ClusterReady)?;

        match selected {
            Ok(stable) => {
                self.stable = Some(stable);
                self.transition(FixtureState::StableSetSelected)
            }
            Err(err) => {
                self.close().await?;
                Err(err.into())
            }
        }
    }

    /// Hand out a view for the next operation.
    pub fn view(&mut self) -> HarnessResult<ClientView> {
        self.transition(FixtureState::Running)?;
        let stable = match &self.stable {
            Some(stable) => stable.clone(),
            None => {
                return Err(HarnessError::IllegalTransition {
                    from: self.state,
                    to: FixtureState::Running,
                })
            }
        };
        Ok(ClientView::new(
            stable,
            self.fixture.retry().clone(),
            RetryExecutor::default(),
            self.fixture.launcher().clone(),
        ))
    }

    /// Stop the cluster and close the session.
    ///
    /// Safe to call in any state; calling it again after close returns an
    /// empty report.
    pub async fn teardown(&mut self) -> TeardownReport {
        if self.state != FixtureState::Closed {
            if let Err(err) = self.close().await {
                tracing::warn!("Fixture {} teardown: {}", self.fixture.name(), err);
            }
        }
        std::mem::take(&mut self.teardown)
    }

    async fn close(&mut self) -> HarnessResult<()> {
        self.transition(FixtureState::TearingDown)?;
        self.stable = None;
        if let Some(mut cluster) = self.cluster.take() {
            let report = self.manager.stop(&mut cluster).await;
            self.teardown.merge(report);
        }
        self.transition(FixtureState::Closed)
    }
}
