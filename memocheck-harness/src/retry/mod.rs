//! Retry semantics for eventually consistent operations.
//!
//! - `policy` - RetryPolicy and Backoff values
//! - `executor` - RetryExecutor running an operation under a policy

pub mod executor;
pub mod policy;

pub use executor::{RetryExecutor, RetryStats};
pub use policy::{Backoff, RetryPolicy};
