//! Run records as stored in the ledger.
//!
//! A Run is one top-to-bottom execution of a step list.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A run row read back from the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Auto-incremented row id
    pub id: i64,

    /// Run name (caller supplied or generated)
    pub name: Option<String>,

    /// When the run started (ISO 8601)
    pub started_at: Option<String>,

    /// When the run reached a terminal state (ISO 8601)
    pub finished_at: Option<String>,

    /// Current status
    pub status: Option<RunStatus>,

    /// Terminal metadata summary
    pub meta: Option<Value>,
}

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Steps are still executing
    Running,

    /// Every attempted step succeeded
    Success,

    /// A step failed, or the step list could not be loaded
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "success" | "ok" => Ok(Self::Success),
            "failed" | "error" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A status string stored in the ledger that this version does not know
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown status '{0}'")]
pub struct UnknownStatus(pub String);
