//! Node launchers.
//!
//! - `sim` - in-process memo nodes with replication delay and fault knobs
//! - `process` - external memo-service processes on local TCP ports

pub mod process;
pub mod sim;

pub use process::{Connector, ProcessLauncher};
pub use sim::{SimLauncher, SimLauncherConfig};
