//! Step execution records.
//!
//! Exactly one record is written per attempted step. Steps after the first
//! failure are never attempted and therefore never recorded.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::run::UnknownStatus;

/// One attempted step, as persisted in the ledger's `tasks` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Row id (None until stored)
    pub id: Option<i64>,

    /// Owning run
    pub run_id: i64,

    /// Step identifier from the step list
    pub step_id: String,

    /// Command line, arguments joined by spaces
    pub cmd: String,

    /// Outcome (None for rows written without a recognized status)
    pub status: Option<StepStatus>,

    /// Process exit code (None if the process never started)
    pub rc: Option<i32>,

    pub started_at: String,

    pub finished_at: String,

    /// Captured stdout, verbatim
    pub stdout: String,

    /// Captured stderr, verbatim
    pub stderr: String,

    /// Extracted result object for structured steps that succeeded
    pub result: Option<Value>,

    /// Error message for failed steps
    pub error: Option<String>,
}

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "error" => Ok(Self::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
