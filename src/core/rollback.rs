//! Best-effort rollback.
//!
//! Runs every rollback step regardless of earlier rollback failures. Step
//! failures and an unreadable rollback list are recorded as events and
//! folded into the summary; they never abort the caller, and neither does
//! a ledger that rejects those events.

use std::path::Path;

use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::adapters::CommandRunner;
use crate::domain::{Event, RollbackSummary};

use super::ledger::Ledger;
use super::step_runner::preview;
use super::steps::{StepList, DEFAULT_ROLLBACK_ID};

pub struct RollbackExecutor<'a> {
    runner: &'a dyn CommandRunner,
    ledger: &'a Ledger,
    preview_chars: usize,
}

impl<'a> RollbackExecutor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, ledger: &'a Ledger, preview_chars: usize) -> Self {
        Self {
            runner,
            ledger,
            preview_chars,
        }
    }

    /// Execute the rollback list at `path`.
    ///
    /// `done` if every rollback step exited zero, `failed` otherwise. Events
    /// are recorded best-effort; a ledger failure never stops the rollback.
    #[instrument(skip(self, path), fields(rollback = %path.display()))]
    pub async fn execute(&self, run_id: i64, path: &Path) -> RollbackSummary {
        let list = match StepList::from_file(path, DEFAULT_ROLLBACK_ID) {
            Ok(list) => list,
            Err(e) => {
                let message = format!("could not read rollback list: {e}");
                warn!(error = %message, "Rollback skipped");
                self.record(
                    &Event::error(run_id, "rollback read error").with_details(json!({ "error": message })),
                );
                return RollbackSummary::failed(Some(message));
            }
        };

        info!(steps = list.len(), "Running rollback");
        let mut all_ok = true;

        for step in &list.steps {
            let (rc, stdout, stderr) = match self.runner.invoke(&step.cmd).await {
                Ok(output) if output.success() => continue,
                Ok(output) => (Some(output.exit_code), output.stdout, output.stderr),
                Err(e) => (None, String::new(), e.to_string()),
            };

            all_ok = false;
            error!(rollback_step_id = %step.step_id, rc = ?rc, "Rollback step failed");
            self.record(&Event::error(run_id, "rollback step error").with_details(json!({
                "rollback_step_id": step.step_id,
                "rc": rc,
                "stdout_head": preview(&stdout, self.preview_chars),
                "stderr_head": preview(&stderr, self.preview_chars),
            })));
        }

        if all_ok {
            RollbackSummary::done()
        } else {
            RollbackSummary::failed(None)
        }
    }

    fn record(&self, event: &Event) {
        if let Err(e) = self.ledger.append_event(event) {
            warn!(event = %event.event, error = %e, "Could not record rollback event");
        }
    }
}
