//! Memo service client contract.
//!
//! Behavior suites only need to record a memoized value under a key and look
//! it up again, possibly through a different node. How that travels over the
//! wire is the launcher's business.

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a [`MemoClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The node could not be reached or refused the request.
    #[error("node unavailable: {0}")]
    Unavailable(String),

    /// The node answered with something the client could not understand.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The launcher has no way to build a client.
    #[error("clients unsupported: {0}")]
    Unsupported(String),
}

/// Client bound to a single memo-service node.
#[async_trait]
pub trait MemoClient: Send + Sync {
    /// Address of the node this client talks to.
    fn address(&self) -> &str;

    /// Record a memoized value under `key`.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), ClientError>;

    /// Look up the memoized value for `key` as this node currently sees it.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ClientError>;
}
