//! The execution report returned to callers.
//!
//! The orchestrator builds one report per run and returns it once. It is
//! also what the CLI prints on stdout.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::run::RunStatus;

/// Result of one orchestrator invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// True when every attempted step succeeded
    pub ok: bool,

    /// Ledger id of the run (None if the run row could not be created)
    pub run_id: Option<i64>,

    /// Terminal status
    pub status: RunStatus,

    /// Outcomes of attempted steps, in order
    pub executed: Vec<StepOutcome>,

    /// What happened to the rollback list
    pub rollback: RollbackSummary,

    /// Run-level failure (unreadable step list, ledger write failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionReport {
    /// A failed report with nothing executed, used as the starting point of
    /// every run and as the result of run-level failures
    pub fn failed(run_id: Option<i64>) -> Self {
        Self {
            ok: false,
            run_id,
            status: RunStatus::Failed,
            executed: Vec::new(),
            rollback: RollbackSummary::skipped(),
            error: None,
        }
    }

    /// Mark the report as failed with a run-level error
    pub fn abort(&mut self, error: impl Into<String>) {
        self.ok = false;
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
    }

    /// Outcome of the step that stopped the run, if any
    pub fn failed_step(&self) -> Option<&StepOutcome> {
        self.executed.iter().find(|s| !s.is_ok())
    }
}

/// Outcome of one attempted step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: String,

    /// Command line that was run
    pub command: String,

    #[serde(flatten)]
    pub result: StepResult,
}

impl StepOutcome {
    pub fn ok(step_id: impl Into<String>, command: impl Into<String>, result: Option<Value>) -> Self {
        Self {
            step_id: step_id.into(),
            command: command.into(),
            result: StepResult::Ok { result },
        }
    }

    pub fn error(step_id: impl Into<String>, command: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            command: command.into(),
            result: StepResult::Error {
                error: error.into(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.result, StepResult::Ok { .. })
    }

    /// Error message for failed steps
    pub fn error_message(&self) -> Option<&str> {
        match &self.result {
            StepResult::Error { error } => Some(error),
            StepResult::Ok { .. } => None,
        }
    }
}

/// Success carries the extracted result, failure carries the message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    Ok { result: Option<Value> },
    Error { error: String },
}

/// Aggregate outcome of the rollback list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackSummary {
    pub status: RollbackStatus,

    /// Why the rollback list could not be read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RollbackSummary {
    pub fn skipped() -> Self {
        Self {
            status: RollbackStatus::Skipped,
            error: None,
        }
    }

    pub fn done() -> Self {
        Self {
            status: RollbackStatus::Done,
            error: None,
        }
    }

    pub fn failed(error: Option<String>) -> Self {
        Self {
            status: RollbackStatus::Failed,
            error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    /// No step failed, or no rollback list was available
    Skipped,

    /// Every rollback step exited zero
    Done,

    /// At least one rollback step failed, or the list was unreadable
    Failed,
}
