//! Harness runner and reporting.
//!
//! ## Submodules
//!
//! - `builder` - HarnessRunner for composing and running cases
//! - `outcome` - Operation and case outcomes
//! - `report` - RunReport summary
//! - `reporter` - Reporter trait and TextReporter
//! - `display` - Colored terminal rendering of a RunReport

pub mod builder;
pub mod display;
pub mod outcome;
pub mod report;
pub mod reporter;

pub use builder::HarnessRunner;
pub use outcome::{CaseReport, CaseStatus, OperationOutcome, OperationReport};
pub use report::RunReport;
pub use reporter::{Reporter, SilentReporter, TextReporter};
