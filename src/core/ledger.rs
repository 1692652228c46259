//! SQLite-backed run ledger.
//!
//! Stores runs, step execution records (`tasks`) and audit events. Every
//! write opens its own connection and auto-commits, so a crash mid-run
//! leaves a consistent partial history and concurrent executors never hold
//! long transactions against each other.
//!
//! The schema is declared once in [`REQUIRED_COLUMNS`]. On open, missing
//! tables are created and any missing column is added in place. Columns are
//! never dropped or renamed, so ledgers written by older versions stay
//! readable.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{Event, RunRecord, RunStatus, StepRecord};

/// How long a connection waits on a lock held by another executor
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Tables owned by the ledger
const TABLES: &[&str] = &["runs", "events", "tasks"];

/// A column the current version requires
#[derive(Debug, Clone, Copy)]
struct ColumnSpec {
    table: &'static str,
    name: &'static str,
    sql_type: &'static str,
}

const fn col(table: &'static str, name: &'static str, sql_type: &'static str) -> ColumnSpec {
    ColumnSpec {
        table,
        name,
        sql_type,
    }
}

/// Every non-id column, in creation order
const REQUIRED_COLUMNS: &[ColumnSpec] = &[
    col("runs", "name", "TEXT"),
    col("runs", "started_at", "TEXT"),
    col("runs", "finished_at", "TEXT"),
    col("runs", "status", "TEXT"),
    col("runs", "meta", "TEXT"),
    col("runs", "run_name", "TEXT"),
    col("runs", "created_at", "TEXT"),
    col("runs", "updated_at", "TEXT"),
    col("events", "run_id", "INTEGER"),
    col("events", "ts", "TEXT"),
    col("events", "level", "TEXT"),
    col("events", "event", "TEXT"),
    col("events", "details", "TEXT"),
    col("events", "created_at", "TEXT"),
    col("tasks", "run_id", "INTEGER"),
    col("tasks", "step_id", "TEXT"),
    col("tasks", "cmd", "TEXT"),
    col("tasks", "status", "TEXT"),
    col("tasks", "rc", "INTEGER"),
    col("tasks", "started_at", "TEXT"),
    col("tasks", "finished_at", "TEXT"),
    col("tasks", "stdout", "TEXT"),
    col("tasks", "stderr", "TEXT"),
    col("tasks", "result", "TEXT"),
    col("tasks", "error", "TEXT"),
];

/// Current UTC time as ISO 8601 with a `Z` suffix
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Ledger storage failures
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to create ledger directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Row counts per table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub runs: u64,
    pub tasks: u64,
    pub events: u64,
}

/// File-backed ledger of runs, steps and events
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Open (or create) a ledger, creating its directory and ensuring the
    /// schema
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let ledger = Self { path };
        let added = ledger.ensure_schema()?;
        if !added.is_empty() {
            info!(db = %ledger.path.display(), columns = ?added, "Ledger schema widened");
        }

        Ok(ledger)
    }

    /// Path to the SQLite file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, LedgerError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Create missing tables and add missing columns.
    ///
    /// Idempotent. Runs inside an IMMEDIATE transaction so two processes
    /// opening the same ledger cannot both add the same column. Returns the
    /// `table.column` names that were added.
    pub fn ensure_schema(&self) -> Result<Vec<String>, LedgerError> {
        let mut conn = self.connect()?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "Ledger connection opened");

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for table in TABLES {
            tx.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {table} (id INTEGER PRIMARY KEY AUTOINCREMENT)"
                ),
                [],
            )?;
        }

        let mut added = Vec::new();
        for table in TABLES {
            let existing = existing_columns(&tx, table)?;
            for spec in REQUIRED_COLUMNS.iter().filter(|c| c.table == *table) {
                if existing.iter().any(|c| c == spec.name) {
                    continue;
                }
                tx.execute(
                    &format!(
                        "ALTER TABLE {} ADD COLUMN {} {}",
                        spec.table, spec.name, spec.sql_type
                    ),
                    [],
                )?;
                added.push(format!("{}.{}", spec.table, spec.name));
            }
        }
        tx.commit()?;

        Ok(added)
    }

    /// Insert a new run with status `running`, returning its id
    pub fn insert_run(&self, name: &str) -> Result<i64, LedgerError> {
        let conn = self.connect()?;
        let ts = now_iso8601();
        conn.execute(
            "INSERT INTO runs (name, started_at, status, meta, run_name, created_at, updated_at) \
             VALUES (?1, ?2, ?3, NULL, ?1, ?2, ?2)",
            params![name, ts, RunStatus::Running.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Terminal write for a run
    pub fn finish_run(&self, run_id: i64, status: RunStatus, meta: &Value) -> Result<(), LedgerError> {
        let conn = self.connect()?;
        let ts = now_iso8601();
        conn.execute(
            "UPDATE runs SET finished_at = ?1, status = ?2, meta = ?3, updated_at = ?1 WHERE id = ?4",
            params![ts, status.as_str(), serde_json::to_string(meta)?, run_id],
        )?;
        Ok(())
    }

    /// Insert one step execution record, returning its id
    pub fn record_step(&self, record: &StepRecord) -> Result<i64, LedgerError> {
        let result = record
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO tasks (run_id, step_id, cmd, status, rc, started_at, finished_at, \
             stdout, stderr, result, error) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.run_id,
                record.step_id,
                record.cmd,
                record.status.map(|s| s.as_str()),
                record.rc,
                record.started_at,
                record.finished_at,
                record.stdout,
                record.stderr,
                result,
                record.error,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Append an audit event, returning its id
    pub fn append_event(&self, event: &Event) -> Result<i64, LedgerError> {
        let details = serde_json::to_string(&event.details)?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO events (run_id, ts, level, event, details, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?2)",
            params![event.run_id, event.ts, event.level.map(|l| l.as_str()), event.event, details],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Row counts per table
    pub fn stats(&self) -> Result<LedgerStats, LedgerError> {
        let conn = self.connect()?;
        let count = |table: &str| -> Result<u64, LedgerError> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
            Ok(n.max(0) as u64)
        };

        Ok(LedgerStats {
            runs: count("runs")?,
            tasks: count("tasks")?,
            events: count("events")?,
        })
    }

    /// Look up a single run
    pub fn run(&self, run_id: i64) -> Result<Option<RunRecord>, LedgerError> {
        let conn = self.connect()?;
        let run = conn
            .query_row(
                "SELECT id, name, started_at, finished_at, status, meta FROM runs WHERE id = ?1",
                params![run_id],
                map_run,
            )
            .optional()?;
        Ok(run)
    }

    /// Most recent runs first
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>, LedgerError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, started_at, finished_at, status, meta FROM runs \
             ORDER BY id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let runs = stmt
            .query_map(params![limit], map_run)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// Step records of a run, in execution order
    pub fn steps_for_run(&self, run_id: i64) -> Result<Vec<StepRecord>, LedgerError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, run_id, step_id, cmd, status, rc, started_at, finished_at, \
             stdout, stderr, result, error FROM tasks WHERE run_id = ?1 ORDER BY id",
        )?;
        let steps = stmt
            .query_map(params![run_id], |row| {
                Ok(StepRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    step_id: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    cmd: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    status: parse_lenient(row, 4)?,
                    rc: row.get(5)?,
                    started_at: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    finished_at: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                    stdout: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                    stderr: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                    result: parse_json(row, 10)?,
                    error: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(steps)
    }

    /// Events of a run in timestamp order
    pub fn events_for_run(&self, run_id: i64) -> Result<Vec<Event>, LedgerError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, run_id, ts, level, event, details FROM events \
             WHERE run_id = ?1 ORDER BY ts, id",
        )?;
        let events = stmt
            .query_map(params![run_id], |row| {
                Ok(Event {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    level: parse_lenient(row, 3)?,
                    event: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    details: parse_json(row, 5)?.unwrap_or(Value::Null),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

fn existing_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))?
        .collect();
    columns
}

fn map_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        status: parse_lenient(row, 4)?,
        meta: parse_json(row, 5)?,
    })
}

/// Parse a nullable text column into `T`.
///
/// NULL and values this version does not recognize read as `None`, so rows
/// written by older versions never fail a query.
fn parse_lenient<T: FromStr>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    let Some(text) = row.get::<_, Option<String>>(idx)? else {
        return Ok(None);
    };
    match text.parse::<T>() {
        Ok(value) => Ok(Some(value)),
        Err(_) => {
            debug!(column = idx, value = %text, "Unrecognized ledger value");
            Ok(None)
        }
    }
}

/// Decode a JSON text column; text that is not JSON is kept as a string
fn parse_json(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Value>> {
    let Some(text) = row.get::<_, Option<String>>(idx)? else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_str(&text).unwrap_or(Value::String(text))))
}
