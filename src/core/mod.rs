//! Core execution logic.
//!
//! This module contains:
//! - Scanner: first-object extraction from noisy output
//! - Steps: step definitions and step-list loading
//! - StepRunner: single-step execution and classification
//! - Ledger: SQLite persistence of runs, steps and events
//! - Rollback: best-effort rollback list execution
//! - Orchestrator: the sequential run loop

pub mod ledger;
pub mod orchestrator;
pub mod rollback;
pub mod scanner;
pub mod step_runner;
pub mod steps;

// Re-export commonly used types
pub use ledger::{now_iso8601, Ledger, LedgerError, LedgerStats};
pub use orchestrator::Orchestrator;
pub use rollback::RollbackExecutor;
pub use scanner::{extract_first_object, JsonObject, ScanError};
pub use step_runner::{classify, validate_result, StepFailure, StepRunner, UnrecordedStep};
pub use steps::{InputError, StepDefinition, StepList, DEFAULT_ROLLBACK_ID, DEFAULT_STEP_ID};
