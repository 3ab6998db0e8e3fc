//! External memo-service processes.
//!
//! Each node is one OS process started from a command template. Arguments may
//! contain placeholders filled in per node:
//!
//! | Placeholder | Value |
//! |-------------|-------|
//! | `{port}` | free TCP port picked for the node |
//! | `{addr}` | `127.0.0.1:{port}` |
//! | `{index}` | spawn index in the cluster |
//! | `{cluster}` | cluster id (hex) |
//!
//! A node is ready once something accepts TCP connections on its port. The
//! memo wire protocol is not known here; clients come from an optional
//! connector supplied by the caller.

use std::collections::{BTreeSet, HashMap};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use memocheck_core::{
    ClientError, ClusterId, LaunchError, LaunchResult, MemoClient, NodeInfo, NodeLauncher,
    NodeProcess, NodeSpec,
};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

use crate::error::{HarnessError, HarnessResult};

const HOST: &str = "127.0.0.1";
const PORT_ATTEMPTS: usize = 16;

/// Builds memo clients for nodes started by a [`ProcessLauncher`].
pub type Connector =
    Arc<dyn Fn(&NodeInfo) -> Result<Box<dyn MemoClient>, ClientError> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Ports handed out to live nodes, per cluster.
#[derive(Debug, Default)]
struct PortBook {
    clusters: Mutex<HashMap<ClusterId, BTreeSet<u16>>>,
}

impl PortBook {
    fn reserve(&self, cluster: ClusterId) -> LaunchResult<u16> {
        for _ in 0..PORT_ATTEMPTS {
            let port = std::net::TcpListener::bind((HOST, 0))?.local_addr()?.port();
            let mut clusters = lock(&self.clusters);
            if clusters.values().any(|ports| ports.contains(&port)) {
                continue;
            }
            clusters.entry(cluster).or_default().insert(port);
            return Ok(port);
        }
        Err(LaunchError::Spawn(format!(
            "no free port after {PORT_ATTEMPTS} attempts"
        )))
    }

    fn release(&self, cluster: ClusterId, port: u16) {
        let mut clusters = lock(&self.clusters);
        let emptied = match clusters.get_mut(&cluster) {
            Some(ports) => {
                ports.remove(&port);
                ports.is_empty()
            }
            None => false,
        };
        if emptied {
            clusters.remove(&cluster);
        }
    }
}

/// Launcher running the memo service as external processes.
#[derive(Clone)]
pub struct ProcessLauncher {
    program: String,
    args: Vec<String>,
    poll_interval: Duration,
    connector: Option<Connector>,
    ports: Arc<PortBook>,
}

impl std::fmt::Debug for ProcessLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessLauncher")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("poll_interval", &self.poll_interval)
            .field("connector", &self.connector.is_some())
            .finish()
    }
}

impl ProcessLauncher {
    /// Launcher running `program` with `args` (placeholders allowed).
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            poll_interval: Duration::from_millis(50),
            connector: None,
            ports: Arc::new(PortBook::default()),
        }
    }

    /// Parse a whitespace-separated command line, e.g. `memod --port {port}`.
    pub fn from_command_line(command: &str) -> HarnessResult<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| HarnessError::Config("empty service command".to_string()))?;
        Ok(Self::new(program, parts))
    }

    /// How often readiness is polled.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Supply memo clients through `connector`.
    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connector = Some(connector);
        self
    }

    fn render_args(&self, spec: &NodeSpec, port: u16) -> Vec<String> {
        let addr = format!("{HOST}:{port}");
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{port}", &port.to_string())
                    .replace("{addr}", &addr)
                    .replace("{index}", &spec.index.to_string())
                    .replace("{cluster}", &spec.cluster.to_string())
            })
            .collect()
    }
}

#[async_trait]
impl NodeLauncher for ProcessLauncher {
    fn name(&self) -> &str {
        "process"
    }

    async fn spawn(&self, spec: NodeSpec) -> LaunchResult<Box<dyn NodeProcess>> {
        let port = self.ports.reserve(spec.cluster)?;
        let args = self.render_args(&spec, port);

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(err) => {
                self.ports.release(spec.cluster, port);
                return Err(LaunchError::Spawn(format!("{}: {}", self.program, err)));
            }
        };

        let address = format!("{HOST}:{port}");
        tracing::debug!(
            "Spawned {} {:?} as node {} at {}",
            self.program,
            args,
            spec.node_id(),
            address
        );
        Ok(Box::new(ServiceProcess {
            child,
            cluster: spec.cluster,
            port,
            address,
            poll_interval: self.poll_interval,
            ports: self.ports.clone(),
            released: false,
        }))
    }

    async fn probe(&self, address: &str) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_millis(500), TcpStream::connect(address)).await,
            Ok(Ok(_))
        )
    }

    fn supports_clients(&self) -> bool {
        self.connector.is_some()
    }

    fn connect(&self, node: &NodeInfo) -> Result<Box<dyn MemoClient>, ClientError> {
        match &self.connector {
            Some(connector) => connector(node),
            None => Err(ClientError::Unsupported(format!(
                "no connector configured for {}",
                node.address
            ))),
        }
    }
}

#[derive(Debug)]
struct ServiceProcess {
    child: Child,
    cluster: ClusterId,
    port: u16,
    address: String,
    poll_interval: Duration,
    ports: Arc<PortBook>,
    released: bool,
}

impl ServiceProcess {
    async fn kill_and_wait(&mut self) -> LaunchResult<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child
            .start_kill()
            .map_err(|e| LaunchError::Terminate(e.to_string()))?;
        self.child
            .wait()
            .await
            .map(|_| ())
            .map_err(|e| LaunchError::Terminate(e.to_string()))
    }

    fn release(&mut self) {
        if !self.released {
            self.ports.release(self.cluster, self.port);
            self.released = true;
        }
    }
}

#[async_trait]
impl NodeProcess for ServiceProcess {
    fn address(&self) -> &str {
        &self.address
    }

    async fn wait_ready(&mut self) -> LaunchResult<()> {
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Err(LaunchError::NotReady(format!(
                    "process exited with {status} before listening on {}",
                    self.address
                )));
            }
            if TcpStream::connect(&self.address).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn terminate(&mut self) -> LaunchResult<()> {
        let result = self.kill_and_wait().await;
        self.release();
        result
    }

    fn kill_now(&mut self) {
        let _ = self.child.start_kill();
        self.release();
    }
}

impl Drop for ServiceProcess {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_substituted() {
        let launcher = ProcessLauncher::from_command_line(
            "memod --listen {addr} --port {port} --id {cluster}-{index}",
        )
        .unwrap();
        let spec = NodeSpec::new(ClusterId::new(0xab), 3);
        assert_eq!(
            launcher.render_args(&spec, 4100),
            vec![
                "--listen",
                "127.0.0.1:4100",
                "--port",
                "4100",
                "--id",
                "00000000000000ab-3",
            ]
        );
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(
            ProcessLauncher::from_command_line("   "),
            Err(HarnessError::Config(_))
        ));
    }

    #[test]
    fn test_ports_unique_and_released() {
        let book = PortBook::default();
        let cluster = ClusterId::new(1);
        let a = book.reserve(cluster).unwrap();
        let b = book.reserve(cluster).unwrap();
        assert_ne!(a, b);
        book.release(cluster, a);
        book.release(cluster, b);
        assert!(lock(&book.clusters).is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_fails_spawn() {
        let launcher = ProcessLauncher::new("memocheck-no-such-binary", Vec::<String>::new());
        let result = launcher.spawn(NodeSpec::new(ClusterId::new(1), 0)).await;
        assert!(matches!(result, Err(LaunchError::Spawn(_))));
        assert!(lock(&launcher.ports.clusters).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exiting_process_never_ready() {
        let launcher = ProcessLauncher::new("false", Vec::<String>::new())
            .with_poll_interval(Duration::from_millis(10));
        let mut process = launcher
            .spawn(NodeSpec::new(ClusterId::new(2), 0))
            .await
            .unwrap();
        let ready = tokio::time::timeout(Duration::from_secs(5), process.wait_ready())
            .await
            .unwrap();
        assert!(matches!(ready, Err(LaunchError::NotReady(_))));
        assert!(!lock(&launcher.ports.clusters).is_empty());

        process.terminate().await.unwrap();
        assert!(lock(&launcher.ports.clusters).is_empty());
        process.terminate().await.unwrap();
        assert!(lock(&launcher.ports.clusters).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_process_terminates() {
        let launcher = ProcessLauncher::new("sleep", ["30"])
            .with_poll_interval(Duration::from_millis(10));
        let mut process = launcher
            .spawn(NodeSpec::new(ClusterId::new(3), 0))
            .await
            .unwrap();
        let address = process.address().to_string();

        let ready = tokio::time::timeout(Duration::from_millis(100), process.wait_ready()).await;
        assert!(ready.is_err(), "sleep never listens");
        assert!(!launcher.probe(&address).await);

        process.terminate().await.unwrap();
        assert!(lock(&launcher.ports.clusters).is_empty());
    }
}
