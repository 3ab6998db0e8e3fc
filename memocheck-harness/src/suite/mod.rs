//! Behavior suites.
//!
//! A behavior suite is a named set of operations asserting how the memo
//! service should behave. Suites know nothing about clusters or fixtures:
//! each operation only sees a [`ClientView`] of the stable nodes it may talk
//! to, plus the retry policy the fixture chose.
//!
//! # Usage
//!
//! Implement [`BehaviorSuite`] directly or build one from closures:
//!
//! ```ignore
//! use futures::FutureExt;
//!
//! let suite = suite("smoke")
//!     .requirements(SuiteRequirements::stable_nodes(1))
//!     .operation("every_node_answers", |view| {
//!         async move {
//!             for node in view.stable_nodes() {
//!                 check::ensure(view.probe(node).await, "node unreachable")?;
//!             }
//!             Ok(())
//!         }
//!         .boxed()
//!     })
//!     .build();
//! ```

pub mod check;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use memocheck_core::{ClusterId, MemoClient, NodeInfo, NodeLauncher};

use crate::error::OperationError;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::selector::StableNodeSet;

/// What a suite needs from a fixture to be meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuiteRequirements {
    /// Minimum size of the stable node set.
    pub min_stable_nodes: usize,
    /// Minimum total cluster size.
    pub min_cluster_size: usize,
    /// Whether operations open memo clients.
    pub needs_client: bool,
}

impl Default for SuiteRequirements {
    fn default() -> Self {
        Self {
            min_stable_nodes: 1,
            min_cluster_size: 1,
            needs_client: false,
        }
    }
}

impl SuiteRequirements {
    /// Requires `n` stable nodes and nothing else.
    pub fn stable_nodes(n: usize) -> Self {
        Self {
            min_stable_nodes: n,
            min_cluster_size: n,
            needs_client: false,
        }
    }

    /// Same requirements, also needing memo clients.
    pub fn with_client(mut self) -> Self {
        self.needs_client = true;
        self
    }
}

/// Everything an operation may touch.
///
/// Built per operation from a fixture session. Holds node snapshots, never
/// process handles, so an operation cannot stop or restart nodes.
pub struct ClientView {
    stable: StableNodeSet,
    retry: RetryPolicy,
    executor: RetryExecutor,
    launcher: Arc<dyn NodeLauncher>,
}

impl fmt::Debug for ClientView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientView")
            .field("stable", &self.stable)
            .field("retry", &self.retry)
            .field("launcher", &self.launcher.name())
            .finish()
    }
}

impl ClientView {
    pub(crate) fn new(
        stable: StableNodeSet,
        retry: RetryPolicy,
        executor: RetryExecutor,
        launcher: Arc<dyn NodeLauncher>,
    ) -> Self {
        Self {
            stable,
            retry,
            executor,
            launcher,
        }
    }

    /// Cluster the stable set was selected from.
    pub fn cluster_id(&self) -> ClusterId {
        self.stable.cluster_id()
    }

    /// Known-stable nodes, ascending by id.
    pub fn stable_nodes(&self) -> &StableNodeSet {
        &self.stable
    }

    /// Retry policy of the fixture.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Executor applying [`retry_policy`](Self::retry_policy).
    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Open a memo client to `node`.
    pub fn client(&self, node: &NodeInfo) -> Result<Box<dyn MemoClient>, OperationError> {
        Ok(self.launcher.connect(node)?)
    }

    /// Whether `node` currently answers.
    pub async fn probe(&self, node: &NodeInfo) -> bool {
        self.launcher.probe(&node.address).await
    }

    /// Run `operation` under the fixture's retry policy.
    pub async fn retry<F, Fut, R>(&self, operation: F) -> Result<R, OperationError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<R, OperationError>>,
    {
        self.executor.execute(&self.retry, operation).await
    }
}

/// Boxed async operation body.
pub type OperationFn =
    Arc<dyn for<'a> Fn(&'a ClientView) -> BoxFuture<'a, Result<(), OperationError>> + Send + Sync>;

/// A named, independently reportable step of a suite.
#[derive(Clone)]
pub struct Operation {
    name: String,
    body: OperationFn,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").field("name", &self.name).finish()
    }
}

impl Operation {
    /// Create an operation from an async closure.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: for<'a> Fn(&'a ClientView) -> BoxFuture<'a, Result<(), OperationError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(body),
        }
    }

    /// Operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the operation against `view`.
    pub fn run<'a>(&self, view: &'a ClientView) -> BoxFuture<'a, Result<(), OperationError>> {
        (self.body)(view)
    }
}

/// A reusable set of behavioral checks, runnable against any fixture that
/// satisfies its [`SuiteRequirements`].
///
/// Implementations hold no per-fixture state: the same suite instance is
/// shared by every test case it is composed into.
pub trait BehaviorSuite: Send + Sync + 'static {
    /// Name used in case names and reports.
    fn name(&self) -> &str;

    /// What the suite needs from a fixture.
    fn requirements(&self) -> SuiteRequirements {
        SuiteRequirements::default()
    }

    /// Operations, run sequentially in this order.
    fn operations(&self) -> Vec<Operation>;
}

/// Suite assembled from closures.
struct FnSuite {
    name: String,
    requirements: SuiteRequirements,
    operations: Vec<Operation>,
}

impl BehaviorSuite for FnSuite {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> SuiteRequirements {
        self.requirements
    }

    fn operations(&self) -> Vec<Operation> {
        self.operations.clone()
    }
}

/// Builder for closure-based suites. See [`suite`].
pub struct SuiteBuilder {
    inner: FnSuite,
}

impl SuiteBuilder {
    /// Set the suite's requirements.
    pub fn requirements(mut self, requirements: SuiteRequirements) -> Self {
        self.inner.requirements = requirements;
        self
    }

    /// Append an operation.
    pub fn operation<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: for<'a> Fn(&'a ClientView) -> BoxFuture<'a, Result<(), OperationError>>
            + Send
            + Sync
            + 'static,
    {
        self.inner.operations.push(Operation::new(name, body));
        self
    }

    /// Finish the suite.
    pub fn build(self) -> Arc<dyn BehaviorSuite> {
        Arc::new(self.inner)
    }
}

/// Start building a suite from closures.
pub fn suite(name: impl Into<String>) -> SuiteBuilder {
    SuiteBuilder {
        inner: FnSuite {
            name: name.into(),
            requirements: SuiteRequirements::default(),
            operations: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;

    #[test]
    fn test_builder_keeps_operation_order() {
        let built = suite("ordered")
            .requirements(SuiteRequirements::stable_nodes(2).with_client())
            .operation("first", |_| async { Ok(()) }.boxed())
            .operation("second", |_| async { Ok(()) }.boxed())
            .build();

        assert_eq!(built.name(), "ordered");
        let names: Vec<_> = built
            .operations()
            .iter()
            .map(|op| op.name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(
            built.requirements(),
            SuiteRequirements {
                min_stable_nodes: 2,
                min_cluster_size: 2,
                needs_client: true,
            }
        );
    }
}
