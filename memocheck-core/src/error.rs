use std::io;

use thiserror::Error;

/// Errors raised by a [`NodeLauncher`](crate::NodeLauncher) or a
/// [`NodeProcess`](crate::NodeProcess) while controlling a node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    /// The node could not be spawned at all.
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// The node was spawned but reported it will never become ready
    /// (for example the process exited during startup).
    #[error("node not ready: {0}")]
    NotReady(String),

    /// The node refused or failed to terminate.
    #[error("terminate failed: {0}")]
    Terminate(String),

    /// I/O error while talking to the node or its process.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for LaunchError {
    fn from(err: io::Error) -> Self {
        LaunchError::Io(err.to_string())
    }
}

/// Result type for launcher operations.
pub type LaunchResult<T> = Result<T, LaunchError>;
