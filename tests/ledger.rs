//! Ledger Integration Tests
//!
//! Schema upgrades on ledgers written by older versions, and concurrent
//! access from more than one handle.

use std::collections::HashSet;
use std::path::Path;

use execloop::core::Ledger;
use execloop::domain::{Event, EventLevel, RunStatus};
use rusqlite::Connection;
use serde_json::json;
use tempfile::TempDir;

fn columns(path: &Path, table: &str) -> Vec<String> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1)")
        .unwrap();
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    names
}

fn create_legacy_ledger(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE runs (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, started_at TEXT);
         CREATE TABLE tasks (id INTEGER PRIMARY KEY, run_id INTEGER, cmd TEXT);
         INSERT INTO runs (name, started_at) VALUES ('legacy', '2024-01-01T00:00:00Z');
         INSERT INTO tasks (run_id, cmd) VALUES (1, 'echo hi');",
    )
    .unwrap();
}

#[test]
fn test_upgrade_keeps_existing_rows() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("executor.db");
    create_legacy_ledger(&path);

    let ledger = Ledger::open(&path).unwrap();

    let run = ledger.run(1).unwrap().unwrap();
    assert_eq!(run.name.as_deref(), Some("legacy"));
    assert_eq!(run.started_at.as_deref(), Some("2024-01-01T00:00:00Z"));
    assert_eq!(run.status, None);
    assert_eq!(run.meta, None);

    let stats = ledger.stats().unwrap();
    assert_eq!(stats.runs, 1);
    assert_eq!(stats.tasks, 1);
    assert_eq!(stats.events, 0);
}

#[test]
fn test_upgrade_adds_missing_columns_once() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("executor.db");
    create_legacy_ledger(&path);

    let ledger = Ledger::open(&path).unwrap();
    let added_again = ledger.ensure_schema().unwrap();
    assert!(added_again.is_empty());

    for table in ["runs", "events", "tasks"] {
        let cols = columns(&path, table);
        let unique: HashSet<_> = cols.iter().collect();
        assert_eq!(unique.len(), cols.len(), "duplicate column in {table}");
    }

    let run_cols = columns(&path, "runs");
    for name in ["status", "finished_at", "meta", "run_name", "updated_at"] {
        assert!(run_cols.iter().any(|c| c == name), "runs.{name} missing");
    }

    let task_cols = columns(&path, "tasks");
    for name in ["step_id", "status", "rc", "stdout", "stderr", "result", "error"] {
        assert!(task_cols.iter().any(|c| c == name), "tasks.{name} missing");
    }
}

#[test]
fn test_upgraded_ledger_accepts_new_runs() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("executor.db");
    create_legacy_ledger(&path);

    let ledger = Ledger::open(&path).unwrap();
    let run_id = ledger.insert_run("after-upgrade").unwrap();
    assert!(run_id > 1);

    ledger
        .finish_run(run_id, RunStatus::Success, &json!({ "executed": 0 }))
        .unwrap();

    let run = ledger.run(run_id).unwrap().unwrap();
    assert_eq!(run.status, Some(RunStatus::Success));
    assert_eq!(run.meta, Some(json!({ "executed": 0 })));
}

#[test]
fn test_two_handles_share_one_ledger() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("executor.db");

    let first = Ledger::open(&path).unwrap();
    let second = Ledger::open(&path).unwrap();

    let a = first.insert_run("first").unwrap();
    let b = second.insert_run("second").unwrap();
    assert!(b > a);

    first.append_event(&Event::info(a, "executor start")).unwrap();
    second.append_event(&Event::info(b, "executor start")).unwrap();

    assert_eq!(first.stats().unwrap().events, 2);
    let recent = second.recent_runs(10).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].id, b);
}

/// Tables as an older executor wrote them: events keyed by `kind`/`payload`,
/// tasks without a status, runs finished with "ok"
fn create_prior_version_ledger(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE runs (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT,
                            started_at TEXT, finished_at TEXT, status TEXT, meta TEXT);
         CREATE TABLE tasks (id INTEGER PRIMARY KEY AUTOINCREMENT, run_id INTEGER,
                             step INTEGER, name TEXT, detail TEXT);
         CREATE TABLE events (id INTEGER PRIMARY KEY AUTOINCREMENT, run_id INTEGER,
                              ts TEXT, kind TEXT, payload TEXT);
         INSERT INTO runs (name, started_at, finished_at, status, meta)
             VALUES ('old-ok', '2024-01-01T00:00:00', '2024-01-01T00:01:00', 'ok', 'not json');
         INSERT INTO runs (name, started_at, status) VALUES ('old-paused', '2024-01-02T00:00:00', 'paused');
         INSERT INTO tasks (run_id, step, name, detail) VALUES (1, 1, 'build', 'done');
         INSERT INTO events (run_id, ts, kind, payload) VALUES (1, '2024-01-01T00:00:01', 'start', '{}');",
    )
    .unwrap();
}

#[test]
fn test_prior_version_rows_read_back() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("executor.db");
    create_prior_version_ledger(&path);

    let ledger = Ledger::open(&path).unwrap();

    let run = ledger.run(1).unwrap().unwrap();
    assert_eq!(run.status, Some(RunStatus::Success));
    assert_eq!(run.meta, Some(json!("not json")));

    let paused = ledger.run(2).unwrap().unwrap();
    assert_eq!(paused.name.as_deref(), Some("old-paused"));
    assert_eq!(paused.status, None);

    let steps = ledger.steps_for_run(1).unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, None);
    assert_eq!(steps[0].rc, None);
    assert_eq!(steps[0].step_id, "");

    let events = ledger.events_for_run(1).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, None);
    assert_eq!(events[0].ts, "2024-01-01T00:00:01");
}

#[test]
fn test_prior_version_rows_do_not_hide_new_runs() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("executor.db");
    create_prior_version_ledger(&path);

    let ledger = Ledger::open(&path).unwrap();
    let run_id = ledger.insert_run("fresh").unwrap();
    ledger
        .append_event(&Event::info(run_id, "executor start"))
        .unwrap();

    let recent = ledger.recent_runs(10).unwrap();
    let names: Vec<_> = recent.iter().map(|r| r.name.as_deref()).collect();
    assert_eq!(names, vec![Some("fresh"), Some("old-paused"), Some("old-ok")]);
    assert_eq!(recent[0].status, Some(RunStatus::Running));

    let events = ledger.events_for_run(run_id).unwrap();
    assert_eq!(events[0].level, Some(EventLevel::Info));
}
