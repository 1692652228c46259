//! Audit events for the executor ledger.
//!
//! Events are append-only: they are inserted once and never updated or
//! deleted. Ordering is timestamp order (ties broken by row id).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::run::UnknownStatus;

/// A single audit event, scoped to a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Row id (None until stored)
    pub id: Option<i64>,

    /// Owning run, if any
    pub run_id: Option<i64>,

    /// When this event occurred (ISO 8601)
    pub ts: String,

    /// Severity (None for rows written without one)
    pub level: Option<EventLevel>,

    /// Short event name, e.g. "step ok"
    pub event: String,

    /// Structured detail payload
    pub details: Value,
}

impl Event {
    /// Create a new event with the current timestamp and empty details
    pub fn new(run_id: Option<i64>, level: EventLevel, event: impl Into<String>) -> Self {
        Self {
            id: None,
            run_id,
            ts: crate::core::ledger::now_iso8601(),
            level: Some(level),
            event: event.into(),
            details: Value::Object(Default::default()),
        }
    }

    pub fn info(run_id: i64, event: impl Into<String>) -> Self {
        Self::new(Some(run_id), EventLevel::Info, event)
    }

    pub fn warning(run_id: i64, event: impl Into<String>) -> Self {
        Self::new(Some(run_id), EventLevel::Warning, event)
    }

    pub fn error(run_id: i64, event: impl Into<String>) -> Self {
        Self::new(Some(run_id), EventLevel::Error, event)
    }

    /// Attach a detail payload
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventLevel {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
