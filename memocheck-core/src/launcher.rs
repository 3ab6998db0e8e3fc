//! Node process control.
//!
//! The engine never talks to the memo service's processes directly. A
//! [`NodeLauncher`] spawns nodes and hands back a [`NodeProcess`], which the
//! cluster owning the node keeps until teardown.
//!
//! ```ignore
//! let mut process = launcher.spawn(NodeSpec::new(cluster, 0)).await?;
//! process.wait_ready().await?;
//! // ... run operations against process.address() ...
//! process.terminate().await?;
//! ```

use std::fmt;

use async_trait::async_trait;

use crate::client::{ClientError, MemoClient};
use crate::error::LaunchResult;
use crate::node::{NodeInfo, NodeSpec};

/// Exclusively owned handle to one spawned node.
///
/// Dropping a `NodeProcess` without calling [`terminate`](Self::terminate) is
/// allowed but implementations should treat it as a forced kill.
#[async_trait]
pub trait NodeProcess: Send + Sync + fmt::Debug {
    /// Address the node serves on.
    fn address(&self) -> &str;

    /// Resolve once the node reports ready.
    ///
    /// May never resolve; callers bound it with a timeout.
    async fn wait_ready(&mut self) -> LaunchResult<()>;

    /// Terminate the node and wait for it to go away.
    ///
    /// Must be safe to call on a node that never became ready or already exited.
    async fn terminate(&mut self) -> LaunchResult<()>;

    /// Forcefully kill the node without waiting.
    ///
    /// Used on drop paths where nothing can be awaited.
    fn kill_now(&mut self);
}

/// Spawns memo-service nodes.
///
/// One launcher is shared by every cluster a fixture starts, so implementations
/// must keep per-cluster state keyed by [`ClusterId`](crate::ClusterId) and
/// must never hand out the same address to two live nodes.
#[async_trait]
pub trait NodeLauncher: Send + Sync + 'static {
    /// Name of this launcher for logs and reports.
    fn name(&self) -> &str;

    /// Spawn one node. Returns as soon as the node exists; readiness is
    /// awaited separately through [`NodeProcess::wait_ready`].
    async fn spawn(&self, spec: NodeSpec) -> LaunchResult<Box<dyn NodeProcess>>;

    /// Whether something answers at `address` right now.
    async fn probe(&self, address: &str) -> bool;

    /// Whether [`connect`](Self::connect) can produce clients.
    fn supports_clients(&self) -> bool {
        false
    }

    /// Open a memo client to a ready node.
    fn connect(&self, node: &NodeInfo) -> Result<Box<dyn MemoClient>, ClientError> {
        Err(ClientError::Unsupported(format!(
            "launcher '{}' cannot open clients to {}",
            self.name(),
            node.id
        )))
    }
}
