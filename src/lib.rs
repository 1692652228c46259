//! execloop - Sequential command executor with an audit ledger
//!
//! Runs an ordered list of external commands, pulls the structured JSON
//! result out of each command's noisy stdout, records every run, step and
//! event in SQLite, and runs a best-effort rollback list when a step fails.
//!
//! # Architecture
//!
//! - Steps run one at a time; the first failing step halts the run
//! - Every attempt is persisted as it happens, so a crash leaves a
//!   consistent partial history
//! - Callers always get an execution report back, never an error
//!
//! # Modules
//!
//! - `adapters`: Process invocation (`CommandRunner`)
//! - `core`: Scanner, StepRunner, Ledger, Rollback, Orchestrator
//! - `domain`: Data structures (Run, Step, Event, Report)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run a step list, rolling back on failure
//! execloop run --commands config/commands.json --rollback config/rollback.json
//!
//! # Inspect the ledger
//! execloop db-stats
//! execloop status 42
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{CommandOutput, CommandRunner, ProcessRunner};
pub use config::ExecutorConfig;
pub use crate::core::{extract_first_object, Ledger, Orchestrator, ScanError, StepDefinition};
pub use domain::{Event, EventLevel, ExecutionReport, RollbackStatus, RunStatus, StepStatus};
