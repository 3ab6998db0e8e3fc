//! Cluster start/stop.
//!
//! `start(n)` spawns all nodes concurrently and joins them behind a readiness
//! barrier. Any node that fails to spawn or become ready fails the whole start,
//! and every node spawned so far is stopped before the error is returned.
//! `stop` terminates every node concurrently, best effort, and is idempotent.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use memocheck_core::{ClusterId, NodeLauncher, NodeSpec, NodeState};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::instrument;

use crate::error::{StartupError, TeardownError};

use super::{Cluster, ClusterConfig, Node};

/// Warnings collected while stopping a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Nodes terminated cleanly.
    pub stopped: usize,
    /// Nodes that did not stop cleanly.
    pub errors: Vec<TeardownError>,
}

impl TeardownReport {
    /// Whether every node stopped cleanly.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: TeardownReport) {
        self.stopped += other.stopped;
        self.errors.extend(other.errors);
    }
}

/// Result of launching one node: the node, or the error plus whatever was
/// spawned and now needs cleaning up.
type LaunchOutcome = Result<Node, (Option<Node>, StartupError)>;

/// Starts and stops clusters through a [`NodeLauncher`].
#[derive(Clone)]
pub struct ClusterManager {
    launcher: Arc<dyn NodeLauncher>,
    config: ClusterConfig,
}

impl std::fmt::Debug for ClusterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterManager")
            .field("launcher", &self.launcher.name())
            .field("config", &self.config)
            .finish()
    }
}

impl ClusterManager {
    /// Create a manager spawning nodes through `launcher`.
    pub fn new(launcher: Arc<dyn NodeLauncher>, config: ClusterConfig) -> Self {
        Self { launcher, config }
    }

    /// The launcher nodes are spawned through.
    pub fn launcher(&self) -> &Arc<dyn NodeLauncher> {
        &self.launcher
    }

    /// Timeouts in use.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Start `n` nodes and wait until all of them are ready.
    ///
    /// Never returns a partial cluster: on failure every spawned node has been
    /// stopped before the error is returned.
    #[instrument(skip_all, fields(launcher = self.launcher.name(), nodes = n))]
    pub async fn start(&self, n: usize) -> Result<Cluster, StartupError> {
        if n == 0 {
            return Err(StartupError::InvalidSize { requested: 0 });
        }

        let cluster_id = ClusterId::random();
        let deadline = Instant::now() + self.config.start_timeout;
        let ready_order = AtomicU64::new(0);

        tracing::debug!("Starting cluster {} with {} node(s)", cluster_id, n);

        let launches = (0..n).map(|index| {
            self.launch_node(NodeSpec::new(cluster_id, index as u32), deadline, &ready_order)
        });
        let outcomes: Vec<LaunchOutcome> = join_all(launches).await;

        let mut nodes = Vec::with_capacity(n);
        let mut first_error: Option<StartupError> = None;
        for outcome in outcomes {
            match outcome {
                Ok(node) => nodes.push(node),
                Err((spawned, err)) => {
                    tracing::error!("Cluster {} startup failure: {}", cluster_id, err);
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                    nodes.extend(spawned);
                }
            }
        }

        if first_error.is_none() {
            first_error = duplicate_address(&nodes);
        }

        let mut cluster = Cluster::new(cluster_id, nodes);
        match first_error {
            None => {
                tracing::info!("Cluster {} ready with {} node(s)", cluster_id, n);
                Ok(cluster)
            }
            Some(err) => {
                tracing::warn!(
                    "Tearing down {} partially started node(s) of cluster {}",
                    cluster.size(),
                    cluster_id
                );
                let report = self.stop(&mut cluster).await;
                for teardown_err in &report.errors {
                    tracing::warn!("{}", teardown_err);
                }
                Err(err)
            }
        }
    }

    /// Spawn one node and wait for it to become ready.
    async fn launch_node(
        &self,
        spec: NodeSpec,
        deadline: Instant,
        ready_order: &AtomicU64,
    ) -> LaunchOutcome {
        let index = spec.index;
        let start_timeout = self.config.start_timeout;

        let process = match timeout_at(deadline, self.launcher.spawn(spec)).await {
            Ok(Ok(process)) => process,
            Ok(Err(source)) => return Err((None, StartupError::Spawn { index, source })),
            Err(_) => {
                return Err((
                    None,
                    StartupError::Timeout {
                        index,
                        timeout: start_timeout,
                    },
                ))
            }
        };

        let mut node = Node::starting(spec.node_id(), process);
        tracing::debug!("Node {} spawned at {}", node.id(), node.address());

        let ready_deadline = deadline.min(Instant::now() + self.config.ready_timeout);
        let ready = timeout_at(ready_deadline, node.process_mut().wait_ready()).await;
        match ready {
            Ok(Ok(())) => {
                let seq = ready_order.fetch_add(1, Ordering::SeqCst);
                node.mark_ready(seq);
                tracing::debug!("Node {} ready (seq {})", node.id(), seq);
                Ok(node)
            }
            Ok(Err(source)) => {
                node.set_state(NodeState::Failed);
                Err((Some(node), StartupError::NotReady { index, source }))
            }
            Err(_) if ready_deadline < deadline => Err((
                Some(node),
                StartupError::ReadyTimeout {
                    index,
                    timeout: self.config.ready_timeout,
                },
            )),
            Err(_) => Err((
                Some(node),
                StartupError::Timeout {
                    index,
                    timeout: start_timeout,
                },
            )),
        }
    }

    /// Terminate every node of the cluster.
    ///
    /// Best effort: a node that fails to stop is killed, recorded in the
    /// report, and does not keep the others from being stopped. Calling this
    /// on an already stopped cluster is a no-op.
    #[instrument(skip_all, fields(cluster = %cluster.id()))]
    pub async fn stop(&self, cluster: &mut Cluster) -> TeardownReport {
        if cluster.is_stopped() {
            tracing::debug!("Cluster {} already stopped", cluster.id());
            return TeardownReport::default();
        }

        let stop_timeout = self.config.stop_timeout;
        let results = join_all(cluster.nodes_mut().iter_mut().map(|node| async move {
            if node.state() == NodeState::Stopped {
                return Ok(false);
            }
            let reason = match timeout(stop_timeout, node.process_mut().terminate()).await {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(_) => Some(format!("terminate timed out after {stop_timeout:?}")),
            };
            match reason {
                None => {
                    node.set_state(NodeState::Stopped);
                    tracing::debug!("Node {} stopped", node.id());
                    Ok(true)
                }
                Some(reason) => {
                    node.process_mut().kill_now();
                    node.set_state(NodeState::Failed);
                    Err(TeardownError {
                        node: node.id(),
                        address: node.address().to_string(),
                        reason,
                    })
                }
            }
        }))
        .await;
        cluster.mark_stopped();

        let mut report = TeardownReport::default();
        for result in results {
            match result {
                Ok(true) => report.stopped += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!("{}", err);
                    report.errors.push(err);
                }
            }
        }
        tracing::info!(
            "Cluster {} stopped ({} clean, {} warning(s))",
            cluster.id(),
            report.stopped,
            report.errors.len()
        );
        report
    }

    /// Start a cluster, run `body` against it, and stop it on every exit path.
    ///
    /// A panic inside `body` still stops the cluster before it is resumed.
    pub async fn with_cluster<T, F>(
        &self,
        n: usize,
        body: F,
    ) -> Result<(T, TeardownReport), StartupError>
    where
        F: for<'a> FnOnce(&'a Cluster) -> BoxFuture<'a, T>,
    {
        let mut cluster = self.start(n).await?;
        let result = AssertUnwindSafe(body(&cluster)).catch_unwind().await;
        let report = self.stop(&mut cluster).await;
        match result {
            Ok(value) => Ok((value, report)),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

fn duplicate_address(nodes: &[Node]) -> Option<StartupError> {
    let mut seen = HashSet::with_capacity(nodes.len());
    nodes
        .iter()
        .find(|n| !seen.insert(n.address()))
        .map(|n| StartupError::DuplicateAddress {
            address: n.address().to_string(),
        })
}
