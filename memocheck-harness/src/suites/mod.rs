//! Built-in behavior suites.
//!
//! - `user` - put/get through one or several stable nodes (needs clients)
//! - `reachability` - stable nodes answer probes (any launcher)

pub mod reachability;
pub mod user;

pub use reachability::ReachabilitySuite;
pub use user::UserSuite;
