//! # memocheck-core
//!
//! Core contracts for the memocheck test-orchestration engine.
//!
//! The memo service under test is an external collaborator. This crate holds the
//! narrow seams the engine talks to it through, plus the identity types every
//! other crate shares:
//!
//! - **Node identity**: [`ClusterId`], [`NodeId`], [`NodeSpec`], [`NodeInfo`], [`NodeState`]
//! - **Process control**: [`NodeLauncher`] spawns nodes, [`NodeProcess`] is the
//!   exclusively-owned handle to one running node
//! - **Memo client**: [`MemoClient`] is how behavior suites talk to a node
//! - **Time**: [`TimeProvider`] so retry backoff can run on an injectable clock
//!
//! Nothing here knows about clusters, fixtures or suites; those live in
//! `memocheck-harness`.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod client;
mod error;
mod launcher;
mod node;
mod time;

// Client exports
pub use client::{ClientError, MemoClient};

// Error exports
pub use error::{LaunchError, LaunchResult};

// Launcher exports
pub use launcher::{NodeLauncher, NodeProcess};

// Node identity exports
pub use node::{ClusterId, NodeId, NodeInfo, NodeSpec, NodeState};

// Time exports
pub use time::{TimeError, TimeProvider, TokioTimeProvider};
