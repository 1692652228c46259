//! Main orchestrator for step-list execution.
//!
//! Runs an ordered step list, stops at the first failing step, runs the
//! rollback list when something failed, and records everything in the
//! ledger. Always hands back a well-formed [`ExecutionReport`].
//!
//! Run states: `Running -> Success | Failed`. Rollback happens after
//! `Failed` and does not change the run's terminal status.

use std::path::Path;

use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::adapters::{CommandRunner, ProcessRunner};
use crate::config::ExecutorConfig;
use crate::domain::{Event, ExecutionReport, RollbackSummary, RunStatus};

use super::ledger::{Ledger, LedgerError};
use super::rollback::RollbackExecutor;
use super::step_runner::StepRunner;
use super::steps::{StepList, DEFAULT_STEP_ID};

/// Sequential command orchestrator
pub struct Orchestrator {
    config: ExecutorConfig,
    ledger: Ledger,
    runner: Box<dyn CommandRunner>,
}

impl Orchestrator {
    /// Create an orchestrator that spawns real processes
    pub fn new(config: ExecutorConfig) -> Result<Self, LedgerError> {
        Self::with_runner(config, Box::new(ProcessRunner::new()))
    }

    /// Create an orchestrator with a custom process-invocation primitive.
    ///
    /// Opens the ledger (creating its directory and schema as needed).
    pub fn with_runner(
        config: ExecutorConfig,
        runner: Box<dyn CommandRunner>,
    ) -> Result<Self, LedgerError> {
        let ledger = Ledger::open(&config.ledger_path)?;
        Ok(Self {
            config,
            ledger,
            runner,
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute the step list at `commands`, rolling back with `rollback` on
    /// failure.
    ///
    /// Step failures, unreadable step lists and ledger write failures all
    /// end up in the returned report; this never panics or returns early
    /// without one.
    #[instrument(skip_all, fields(commands = %commands.display()))]
    pub async fn run(
        &self,
        commands: &Path,
        rollback: Option<&Path>,
        run_name: Option<&str>,
    ) -> ExecutionReport {
        let name = run_name
            .map(str::to_owned)
            .unwrap_or_else(|| self.config.default_run_name());

        let run_id = match self.ledger.insert_run(&name) {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "Could not create run");
                let mut report = ExecutionReport::failed(None);
                report.abort(format!("ledger error: {e}"));
                return report;
            }
        };
        info!(run_id, %name, runner = self.runner.name(), "Starting run");

        let mut report = ExecutionReport::failed(Some(run_id));
        if let Err(e) = self.drive(run_id, commands, rollback, &mut report).await {
            let message = format!("ledger error: {e}");
            error!(run_id, error = %message, "Run aborted");
            report.abort(message.clone());

            let meta = json!({ "executed": report.executed.len(), "error": message });
            if let Err(e) = self.ledger.finish_run(run_id, RunStatus::Failed, &meta) {
                warn!(run_id, error = %e, "Could not finalize aborted run");
            }
        }

        report
    }

    /// The run proper; any `Err` is a ledger failure
    async fn drive(
        &self,
        run_id: i64,
        commands: &Path,
        rollback: Option<&Path>,
        report: &mut ExecutionReport,
    ) -> Result<(), LedgerError> {
        self.ledger.append_event(
            &Event::info(run_id, "executor start")
                .with_details(json!({ "commands_path": commands.display().to_string() })),
        )?;

        let list = match StepList::from_file(commands, DEFAULT_STEP_ID) {
            Ok(list) => list,
            Err(e) => {
                let message = format!("could not read step list: {e}");
                error!(run_id, error = %message, "Run failed before any step");
                self.ledger.append_event(
                    &Event::error(run_id, "commands read error").with_details(json!({ "error": message })),
                )?;
                self.ledger
                    .finish_run(run_id, RunStatus::Failed, &json!({ "error": message }))?;
                report.abort(message);
                return Ok(());
            }
        };
        info!(run_id, steps = list.len(), digest = %list.digest, "Step list loaded");

        let step_runner = StepRunner::new(self.runner.as_ref(), &self.ledger, self.config.preview_chars);
        let mut unrecorded = None;
        for step in &list.steps {
            match step_runner.execute(run_id, step).await {
                Ok(outcome) => {
                    let failed = !outcome.is_ok();
                    report.executed.push(outcome);
                    if failed {
                        break;
                    }
                }
                Err(e) => {
                    error!(run_id, error = %e, "Step outcome not recorded");
                    report.executed.push(e.outcome);
                    unrecorded = Some(e.source);
                    break;
                }
            }
        }

        let ok = unrecorded.is_none() && report.executed.iter().all(|s| s.is_ok());
        if !ok {
            if let Some(failed) = report.failed_step() {
                info!(run_id, step_id = %failed.step_id, "Rolling back after failed step");
            }
            match self.roll_back(run_id, rollback).await {
                Ok(summary) => report.rollback = summary,
                Err(e) if unrecorded.is_none() => return Err(e),
                Err(e) => warn!(run_id, error = %e, "Could not start rollback"),
            }
        }
        if let Some(e) = unrecorded {
            return Err(e);
        }

        let status = if ok { RunStatus::Success } else { RunStatus::Failed };
        report.ok = ok;
        report.status = status;

        self.ledger.finish_run(
            run_id,
            status,
            &json!({ "executed": report.executed.len(), "commands_digest": list.digest }),
        )?;
        self.ledger.append_event(&Event::info(run_id, "executor finish").with_details(json!({
            "status": status.as_str(),
            "executed": report.executed.len(),
            "rollback": report.rollback.status,
        })))?;

        info!(run_id, %status, executed = report.executed.len(), "Run finished");
        Ok(())
    }

    async fn roll_back(&self, run_id: i64, rollback: Option<&Path>) -> Result<RollbackSummary, LedgerError> {
        let Some(path) = rollback else {
            return Ok(RollbackSummary::skipped());
        };

        if !path.exists() {
            warn!(run_id, rollback = %path.display(), "Rollback list not found");
            self.ledger.append_event(
                &Event::warning(run_id, "rollback file missing")
                    .with_details(json!({ "rollback_path": path.display().to_string() })),
            )?;
            return Ok(RollbackSummary::skipped());
        }

        Ok(
            RollbackExecutor::new(self.runner.as_ref(), &self.ledger, self.config.rollback_preview_chars)
                .execute(run_id, path)
                .await,
        )
    }
}
