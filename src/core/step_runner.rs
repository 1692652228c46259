//! Single-step execution and outcome classification.
//!
//! Runs one step's command, classifies the result against the step's
//! expectations, and writes exactly one task record and one event for the
//! attempt.

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::adapters::{CommandOutput, CommandRunner};
use crate::domain::{Event, StepOutcome, StepRecord, StepStatus};

use super::ledger::{now_iso8601, Ledger, LedgerError};
use super::scanner::{extract_first_object, JsonObject, ScanError};
use super::steps::StepDefinition;

/// Why a step failed. The `Display` text is the report's error message.
#[derive(Debug, Clone, Error)]
pub enum StepFailure {
    #[error("failed to spawn `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    #[error("command exited with code {exit_code}\nSTDOUT (preview):\n{stdout}\n\nSTDERR (preview):\n{stderr}")]
    NonZeroExit {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("non-structured output (rc={exit_code}): {cause}\nSTDOUT (preview):\n{stdout}\n\nSTDERR (preview):\n{stderr}")]
    NonStructuredOutput {
        exit_code: i32,
        cause: ScanError,
        stdout: String,
        stderr: String,
    },

    #[error("invalid result: {}", .problems.join("; "))]
    InvalidResult { problems: Vec<String> },

    #[error("command failed despite structured result (rc={exit_code})\nSTDERR (preview):\n{stderr}")]
    FailedDespiteResult { exit_code: i32, stderr: String },
}

/// A step that ran but whose task record or event could not be written
#[derive(Debug, Error)]
#[error("step '{}' ran but was not recorded: {source}", .outcome.step_id)]
pub struct UnrecordedStep {
    pub outcome: StepOutcome,
    #[source]
    pub source: LedgerError,
}

/// First `max_chars` characters of `text`
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Check required and non-empty fields of a result object.
///
/// Every problem is reported, in field-list order.
pub fn validate_result(
    data: &JsonObject,
    must_have: &[String],
    non_empty: &[String],
) -> Result<(), StepFailure> {
    let mut problems = Vec::new();

    for key in must_have {
        if !data.contains_key(key) {
            problems.push(format!("missing required key '{key}'"));
        }
    }

    for key in non_empty {
        match data.get(key) {
            None => problems.push(format!("field '{key}' not found")),
            Some(Value::Null) => problems.push(format!("field '{key}' is null")),
            Some(value) if is_empty(value) => problems.push(format!("field '{key}' is empty")),
            Some(_) => {}
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(StepFailure::InvalidResult { problems })
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Classify a finished invocation against the step's expectations.
///
/// Returns the extracted object for structured steps, `None` for plain ones.
pub fn classify(
    step: &StepDefinition,
    output: &CommandOutput,
    preview_chars: usize,
) -> Result<Option<JsonObject>, StepFailure> {
    if !step.expect_json {
        if output.success() {
            return Ok(None);
        }
        return Err(StepFailure::NonZeroExit {
            exit_code: output.exit_code,
            stdout: preview(&output.stdout, preview_chars),
            stderr: preview(&output.stderr, preview_chars),
        });
    }

    let data = extract_first_object(&output.stdout).map_err(|cause| {
        StepFailure::NonStructuredOutput {
            exit_code: output.exit_code,
            cause,
            stdout: preview(&output.stdout, preview_chars),
            stderr: preview(&output.stderr, preview_chars),
        }
    })?;

    validate_result(&data, &step.must_have, &step.fail_if_empty_fields)?;

    if !output.success() {
        return Err(StepFailure::FailedDespiteResult {
            exit_code: output.exit_code,
            stderr: preview(&output.stderr, preview_chars),
        });
    }

    Ok(Some(data))
}

/// Executes steps and records each attempt in the ledger
pub struct StepRunner<'a> {
    runner: &'a dyn CommandRunner,
    ledger: &'a Ledger,
    preview_chars: usize,
}

impl<'a> StepRunner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, ledger: &'a Ledger, preview_chars: usize) -> Self {
        Self {
            runner,
            ledger,
            preview_chars,
        }
    }

    /// Run one step and record it.
    ///
    /// Step failures are returned inside the outcome. A ledger write failure
    /// still hands back the outcome, since the command did run.
    #[instrument(skip(self, step), fields(step_id = %step.step_id))]
    pub async fn execute(&self, run_id: i64, step: &StepDefinition) -> Result<StepOutcome, UnrecordedStep> {
        let command = step.command_line();
        let started_at = now_iso8601();
        let invocation = self.runner.invoke(&step.cmd).await;
        let finished_at = now_iso8601();

        let (rc, stdout, stderr, classified) = match invocation {
            Ok(output) => {
                let classified = classify(step, &output, self.preview_chars);
                (Some(output.exit_code), output.stdout, output.stderr, classified)
            }
            Err(e) => {
                let failure = StepFailure::Spawn {
                    program: step.cmd.first().cloned().unwrap_or_default(),
                    reason: e.to_string(),
                };
                (None, String::new(), e.to_string(), Err(failure))
            }
        };

        let (status, result, error_message) = match classified {
            Ok(data) => (StepStatus::Ok, data.map(Value::Object), None),
            Err(failure) => (StepStatus::Error, None, Some(failure.to_string())),
        };

        let record = StepRecord {
            id: None,
            run_id,
            step_id: step.step_id.clone(),
            cmd: command.clone(),
            status: Some(status),
            rc,
            started_at,
            finished_at,
            stdout,
            stderr,
            result: result.clone(),
            error: error_message.clone(),
        };

        let (outcome, event) = match error_message {
            None => {
                info!(rc = ?rc, "Step ok");
                let event =
                    Event::info(run_id, "step ok").with_details(json!({ "step_id": step.step_id }));
                (StepOutcome::ok(&step.step_id, command, result), event)
            }
            Some(message) => {
                error!(rc = ?rc, error = %message, "Step failed");
                let event = Event::error(run_id, "step error").with_details(json!({
                    "step_id": step.step_id,
                    "rc": rc,
                    "error": message,
                }));
                (StepOutcome::error(&step.step_id, command, message), event)
            }
        };

        match self
            .ledger
            .record_step(&record)
            .and_then(|_| self.ledger.append_event(&event))
        {
            Ok(_) => Ok(outcome),
            Err(source) => Err(UnrecordedStep { outcome, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test fixture must be an object"),
        }
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_step_exit_codes() {
        let step = StepDefinition::new("build", &["make"]);

        let ok = classify(&step, &CommandOutput::new(0, "built", ""), 2000).unwrap();
        assert!(ok.is_none());

        let err = classify(&step, &CommandOutput::new(2, "partial", "boom"), 2000).unwrap_err();
        assert!(matches!(err, StepFailure::NonZeroExit { exit_code: 2, .. }));
        let message = err.to_string();
        assert!(message.contains("code 2"));
        assert!(message.contains("partial"));
        assert!(message.contains("boom"));
    }

    #[test]
    fn test_preview_is_bounded() {
        let step = StepDefinition::new("noisy", &["noisy"]);
        let long = "é".repeat(5000);
        let err = classify(&step, &CommandOutput::new(1, long.clone(), long), 10).unwrap_err();
        match err {
            StepFailure::NonZeroExit { stdout, stderr, .. } => {
                assert_eq!(stdout.chars().count(), 10);
                assert_eq!(stderr.chars().count(), 10);
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn test_structured_step_ok() {
        let step = StepDefinition::new("quality", &["q"])
            .expecting_json()
            .with_must_have(&["lint"]);
        let output = CommandOutput::new(0, "INFO start\n{\"lint\": {\"ok\": true}}\nDONE", "");

        let data = classify(&step, &output, 2000).unwrap().unwrap();
        assert_eq!(data, obj(json!({"lint": {"ok": true}})));
    }

    #[test]
    fn test_structured_step_without_object() {
        let step = StepDefinition::new("quality", &["q"]).expecting_json();
        // Exit code 0 does not rescue missing output.
        let err = classify(&step, &CommandOutput::new(0, "just logs", ""), 2000).unwrap_err();
        assert!(matches!(
            err,
            StepFailure::NonStructuredOutput {
                cause: ScanError::NoObjectFound,
                ..
            }
        ));
        assert!(err.to_string().starts_with("non-structured output"));
    }

    #[test]
    fn test_structured_step_nonzero_exit() {
        let step = StepDefinition::new("quality", &["q"]).expecting_json();
        let err = classify(&step, &CommandOutput::new(1, "{\"ok\": false}", "tests failed"), 2000)
            .unwrap_err();
        assert!(matches!(err, StepFailure::FailedDespiteResult { exit_code: 1, .. }));
        assert!(err.to_string().contains("tests failed"));
    }

    #[test]
    fn test_validation_runs_before_exit_code() {
        let step = StepDefinition::new("quality", &["q"])
            .expecting_json()
            .with_must_have(&["lint"]);
        let err = classify(&step, &CommandOutput::new(1, "{\"tests\": 1}", ""), 2000).unwrap_err();
        assert!(matches!(err, StepFailure::InvalidResult { .. }));
    }

    #[test]
    fn test_validate_result_problems() {
        let data = obj(json!({
            "present": 1,
            "null_field": null,
            "empty_str": "",
            "empty_list": [],
            "empty_map": {},
            "zero": 0,
            "falsy": false,
        }));

        assert!(validate_result(&data, &keys(&["present"]), &keys(&["zero", "falsy"])).is_ok());

        let err = validate_result(
            &data,
            &keys(&["present", "absent"]),
            &keys(&["null_field", "empty_str", "empty_list", "empty_map", "gone"]),
        )
        .unwrap_err();

        match err {
            StepFailure::InvalidResult { problems } => {
                assert_eq!(
                    problems,
                    vec![
                        "missing required key 'absent'",
                        "field 'null_field' is null",
                        "field 'empty_str' is empty",
                        "field 'empty_list' is empty",
                        "field 'empty_map' is empty",
                        "field 'gone' not found",
                    ]
                );
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_result_message_names_fields() {
        let err = validate_result(&obj(json!({})), &keys(&["lint"]), &[]).unwrap_err();
        assert_eq!(err.to_string(), "invalid result: missing required key 'lint'");
    }
}
