//! Domain types for the executor.
//!
//! This module contains the core data structures:
//! - Run: ledger run rows and their status
//! - Step: per-step execution records
//! - Events: append-only audit entries
//! - Report: the execution report handed back to callers

pub mod events;
pub mod report;
pub mod run;
pub mod step;

// Re-export commonly used types
pub use events::{Event, EventLevel};
pub use report::{ExecutionReport, RollbackStatus, RollbackSummary, StepOutcome, StepResult};
pub use run::{RunRecord, RunStatus, UnknownStatus};
pub use step::{StepRecord, StepStatus};
