//! In-process memo cluster.
//!
//! Each node is a key/value store living in the launcher. A write is applied
//! on the node that received it and replicated to the other nodes of the same
//! cluster after `replication_delay`, which opens the eventual-consistency
//! window that retry policies exist to absorb. Replicated writes carry a
//! per-cluster version; a node keeps the highest version it has seen for a key
//! so late deliveries never resurrect an overwritten value.
//!
//! Nodes live at `sim://{cluster}/{index}`, so addresses are unique across
//! every cluster the launcher has alive.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use memocheck_core::{
    ClientError, ClusterId, LaunchError, LaunchResult, MemoClient, NodeId, NodeInfo,
    NodeLauncher, NodeProcess, NodeSpec,
};
use tokio_util::sync::CancellationToken;

const SCHEME: &str = "sim://";

/// Behavior and fault knobs of a [`SimLauncher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimLauncherConfig {
    /// Time between spawn and ready.
    pub ready_delay: Duration,
    /// Time for a write to reach the other nodes of the cluster.
    pub replication_delay: Duration,
    /// Node index that becomes ready `lag` late and never receives
    /// replicated writes, like a node that joined and has not caught up.
    pub lagging_at: Option<u32>,
    /// Extra readiness delay of the lagging node.
    pub lag: Duration,
    /// Node index whose spawn fails.
    pub fail_spawn_at: Option<u32>,
    /// Node index that never becomes ready.
    pub never_ready_at: Option<u32>,
    /// Node index whose graceful terminate fails.
    pub fail_terminate_at: Option<u32>,
}

impl Default for SimLauncherConfig {
    fn default() -> Self {
        Self {
            ready_delay: Duration::from_millis(5),
            replication_delay: Duration::from_millis(20),
            lagging_at: None,
            lag: Duration::from_millis(50),
            fail_spawn_at: None,
            never_ready_at: None,
            fail_terminate_at: None,
        }
    }
}

impl SimLauncherConfig {
    /// No readiness delay and synchronous replication.
    pub fn instant() -> Self {
        Self {
            ready_delay: Duration::ZERO,
            replication_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Set the replication delay.
    pub fn with_replication_delay(mut self, delay: Duration) -> Self {
        self.replication_delay = delay;
        self
    }

    /// Make node `index` a lagging node.
    pub fn with_lagging_node(mut self, index: u32) -> Self {
        self.lagging_at = Some(index);
        self
    }

    /// Make spawning node `index` fail.
    pub fn with_spawn_failure(mut self, index: u32) -> Self {
        self.fail_spawn_at = Some(index);
        self
    }

    /// Make node `index` never become ready.
    pub fn with_never_ready(mut self, index: u32) -> Self {
        self.never_ready_at = Some(index);
        self
    }

    /// Make terminating node `index` fail.
    pub fn with_terminate_failure(mut self, index: u32) -> Self {
        self.fail_terminate_at = Some(index);
        self
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn address_of(id: NodeId) -> String {
    format!("{SCHEME}{}/{}", id.cluster, id.index)
}

fn parse_address(address: &str) -> Option<NodeId> {
    let rest = address.strip_prefix(SCHEME)?;
    let (cluster, index) = rest.split_once('/')?;
    Some(NodeId::new(
        ClusterId::parse_hex(cluster)?,
        index.parse().ok()?,
    ))
}

#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    value: Vec<u8>,
}

#[derive(Debug)]
struct SimNode {
    id: NodeId,
    address: String,
    lagging: bool,
    ready: AtomicBool,
    shutdown: CancellationToken,
    store: Mutex<HashMap<String, Versioned>>,
}

impl SimNode {
    fn serving(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && !self.shutdown.is_cancelled()
    }

    fn apply(&self, key: &str, entry: Versioned) {
        let mut store = lock(&self.store);
        let newer = store
            .get(key)
            .map_or(true, |current| current.version < entry.version);
        if newer {
            store.insert(key.to_string(), entry);
        }
    }
}

#[derive(Debug, Default)]
struct SimCluster {
    nodes: Mutex<BTreeMap<u32, Arc<SimNode>>>,
    version: AtomicU64,
}

#[derive(Debug, Default)]
struct Registry {
    clusters: Mutex<HashMap<ClusterId, Arc<SimCluster>>>,
}

impl Registry {
    fn cluster(&self, id: ClusterId) -> Arc<SimCluster> {
        lock(&self.clusters).entry(id).or_default().clone()
    }

    fn node(&self, id: NodeId) -> Option<(Arc<SimCluster>, Arc<SimNode>)> {
        let cluster = lock(&self.clusters).get(&id.cluster)?.clone();
        let node = lock(&cluster.nodes).get(&id.index)?.clone();
        Some((cluster, node))
    }

    fn remove(&self, id: NodeId) {
        let mut clusters = lock(&self.clusters);
        let emptied = match clusters.get(&id.cluster) {
            Some(cluster) => {
                let mut nodes = lock(&cluster.nodes);
                nodes.remove(&id.index);
                nodes.is_empty()
            }
            None => false,
        };
        if emptied {
            clusters.remove(&id.cluster);
        }
    }
}

/// Launcher running memo nodes as in-process state.
#[derive(Debug, Clone, Default)]
pub struct SimLauncher {
    config: SimLauncherConfig,
    registry: Arc<Registry>,
}

impl SimLauncher {
    /// Create a launcher with `config`.
    pub fn new(config: SimLauncherConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Registry::default()),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &SimLauncherConfig {
        &self.config
    }

    /// Nodes currently serving, across all clusters.
    pub fn live_nodes(&self) -> usize {
        let clusters: Vec<_> = lock(&self.registry.clusters).values().cloned().collect();
        clusters
            .iter()
            .map(|c| lock(&c.nodes).values().filter(|n| n.serving()).count())
            .sum()
    }

    /// Clusters with at least one node not yet torn down.
    pub fn cluster_count(&self) -> usize {
        lock(&self.registry.clusters).len()
    }
}

#[async_trait]
impl NodeLauncher for SimLauncher {
    fn name(&self) -> &str {
        "sim"
    }

    async fn spawn(&self, spec: NodeSpec) -> LaunchResult<Box<dyn NodeProcess>> {
        if self.config.fail_spawn_at == Some(spec.index) {
            return Err(LaunchError::Spawn(format!(
                "injected spawn failure at node {}",
                spec.index
            )));
        }

        let id = spec.node_id();
        let node = Arc::new(SimNode {
            id,
            address: address_of(id),
            lagging: self.config.lagging_at == Some(spec.index),
            ready: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            store: Mutex::new(HashMap::new()),
        });

        let cluster = self.registry.cluster(spec.cluster);
        {
            let mut nodes = lock(&cluster.nodes);
            if nodes.contains_key(&spec.index) {
                return Err(LaunchError::Spawn(format!("{} already running", node.address)));
            }
            nodes.insert(spec.index, node.clone());
        }
        tracing::debug!("Sim node {} spawned", node.address);

        let mut ready_delay = self.config.ready_delay;
        if node.lagging {
            ready_delay += self.config.lag;
        }
        Ok(Box::new(SimProcess {
            node,
            registry: self.registry.clone(),
            ready_delay,
            never_ready: self.config.never_ready_at == Some(spec.index),
            fail_terminate: self.config.fail_terminate_at == Some(spec.index),
        }))
    }

    async fn probe(&self, address: &str) -> bool {
        parse_address(address)
            .and_then(|id| self.registry.node(id))
            .is_some_and(|(_, node)| node.serving())
    }

    fn supports_clients(&self) -> bool {
        true
    }

    fn connect(&self, node: &NodeInfo) -> Result<Box<dyn MemoClient>, ClientError> {
        let (cluster, sim_node) = self
            .registry
            .node(node.id)
            .ok_or_else(|| ClientError::Unavailable(format!("{} is not running", node.address)))?;
        Ok(Box::new(SimClient {
            cluster,
            node: sim_node,
            replication_delay: self.config.replication_delay,
        }))
    }
}

#[derive(Debug)]
struct SimProcess {
    node: Arc<SimNode>,
    registry: Arc<Registry>,
    ready_delay: Duration,
    never_ready: bool,
    fail_terminate: bool,
}

impl SimProcess {
    fn shut_down(&self) {
        self.node.shutdown.cancel();
        self.registry.remove(self.node.id);
    }
}

#[async_trait]
impl NodeProcess for SimProcess {
    fn address(&self) -> &str {
        &self.node.address
    }

    async fn wait_ready(&mut self) -> LaunchResult<()> {
        if self.never_ready {
            self.node.shutdown.cancelled().await;
            return Err(LaunchError::NotReady(format!(
                "{} shut down before becoming ready",
                self.node.address
            )));
        }
        tokio::select! {
            _ = tokio::time::sleep(self.ready_delay) => {}
            _ = self.node.shutdown.cancelled() => {
                return Err(LaunchError::NotReady(format!(
                    "{} shut down before becoming ready",
                    self.node.address
                )));
            }
        }
        self.node.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn terminate(&mut self) -> LaunchResult<()> {
        if self.fail_terminate {
            return Err(LaunchError::Terminate(format!(
                "injected terminate failure at {}",
                self.node.address
            )));
        }
        self.shut_down();
        Ok(())
    }

    fn kill_now(&mut self) {
        self.shut_down();
    }
}

impl Drop for SimProcess {
    fn drop(&mut self) {
        self.shut_down();
    }
}

/// Client of one sim node.
#[derive(Debug)]
struct SimClient {
    cluster: Arc<SimCluster>,
    node: Arc<SimNode>,
    replication_delay: Duration,
}

impl SimClient {
    fn check_serving(&self) -> Result<(), ClientError> {
        if self.node.serving() {
            Ok(())
        } else {
            Err(ClientError::Unavailable(format!(
                "{} is not serving",
                self.node.address
            )))
        }
    }

    fn replicate(&self, key: &str, entry: &Versioned) {
        let peers: Vec<_> = lock(&self.cluster.nodes)
            .values()
            .filter(|peer| peer.id != self.node.id && !peer.lagging)
            .cloned()
            .collect();

        for peer in peers {
            if self.replication_delay.is_zero() {
                peer.apply(key, entry.clone());
                continue;
            }
            let delay = self.replication_delay;
            let key = key.to_string();
            let entry = entry.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => peer.apply(&key, entry),
                    _ = peer.shutdown.cancelled() => {}
                }
            });
        }
    }
}

#[async_trait]
impl MemoClient for SimClient {
    fn address(&self) -> &str {
        &self.node.address
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), ClientError> {
        self.check_serving()?;
        let entry = Versioned {
            version: self.cluster.version.fetch_add(1, Ordering::SeqCst) + 1,
            value,
        };
        self.node.apply(key, entry.clone());
        self.replicate(key, &entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ClientError> {
        self.check_serving()?;
        Ok(lock(&self.node.store).get(key).map(|e| e.value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ready_node(
        launcher: &SimLauncher,
        cluster: ClusterId,
        index: u32,
    ) -> (NodeInfo, Box<dyn NodeProcess>) {
        let mut process = launcher
            .spawn(NodeSpec::new(cluster, index))
            .await
            .unwrap();
        process.wait_ready().await.unwrap();
        let info = NodeInfo {
            id: NodeId::new(cluster, index),
            address: process.address().to_string(),
            ready_seq: index as u64,
        };
        (info, process)
    }

    #[test]
    fn test_address_round_trip() {
        let id = NodeId::new(ClusterId::new(0xbeef), 7);
        assert_eq!(parse_address(&address_of(id)), Some(id));
        assert_eq!(parse_address("tcp://127.0.0.1:80"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_replicates_after_delay() {
        let launcher = SimLauncher::new(
            SimLauncherConfig::instant().with_replication_delay(Duration::from_millis(100)),
        );
        let cluster = ClusterId::new(1);
        let (a, _pa) = ready_node(&launcher, cluster, 0).await;
        let (b, _pb) = ready_node(&launcher, cluster, 1).await;

        let writer = launcher.connect(&a).unwrap();
        let reader = launcher.connect(&b).unwrap();
        writer.put("k", b"v".to_vec()).await.unwrap();

        assert_eq!(writer.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(reader.get("k").await.unwrap(), None);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(reader.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_replication_does_not_resurrect_old_value() {
        let launcher = SimLauncher::new(
            SimLauncherConfig::instant().with_replication_delay(Duration::from_millis(100)),
        );
        let cluster = ClusterId::new(2);
        let (a, _pa) = ready_node(&launcher, cluster, 0).await;
        let (b, _pb) = ready_node(&launcher, cluster, 1).await;

        launcher.connect(&a).unwrap().put("k", b"old".to_vec()).await.unwrap();
        let b_client = launcher.connect(&b).unwrap();
        b_client.put("k", b"new".to_vec()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(b_client.get("k").await.unwrap(), Some(b"new".to_vec()));
        let a_client = launcher.connect(&a).unwrap();
        assert_eq!(a_client.get("k").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_terminate_removes_node() {
        let launcher = SimLauncher::new(SimLauncherConfig::instant());
        let mut process = launcher
            .spawn(NodeSpec::new(ClusterId::new(3), 0))
            .await
            .unwrap();
        process.wait_ready().await.unwrap();
        let address = process.address().to_string();
        assert!(launcher.probe(&address).await);
        assert_eq!(launcher.live_nodes(), 1);

        process.terminate().await.unwrap();
        assert!(!launcher.probe(&address).await);
        assert_eq!(launcher.live_nodes(), 0);
        assert_eq!(launcher.cluster_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_spawn_failure() {
        let launcher = SimLauncher::new(SimLauncherConfig::instant().with_spawn_failure(2));
        let result = launcher.spawn(NodeSpec::new(ClusterId::new(4), 2)).await;
        assert!(matches!(result, Err(LaunchError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_duplicate_spawn_rejected() {
        let launcher = SimLauncher::new(SimLauncherConfig::instant());
        let spec = NodeSpec::new(ClusterId::new(5), 0);
        let _first = launcher.spawn(spec).await.unwrap();
        assert!(matches!(
            launcher.spawn(spec).await,
            Err(LaunchError::Spawn(_))
        ));
    }
}
