//! Step definitions and step-list loading.
//!
//! A step list is a JSON (or YAML) file holding either a bare list of steps
//! or a map with a `steps` key holding that list. Every optional field gets
//! its default here, once, so the rest of the executor never has to check
//! for missing keys.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Step id used when a main-sequence step has none
pub const DEFAULT_STEP_ID: &str = "step";

/// Step id used when a rollback step has none
pub const DEFAULT_ROLLBACK_ID: &str = "rollback";

/// Errors loading a step list
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {format}: {message}")]
    Parse { format: &'static str, message: String },

    #[error("invalid step list: must be a list or a map with a 'steps' list")]
    Shape,

    #[error("invalid step #{index}: {source}")]
    Step {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One step to execute. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub step_id: String,

    /// Argument vector; empty means a no-op invocation
    pub cmd: Vec<String>,

    /// Require a JSON object on stdout
    pub expect_json: bool,

    /// Keys that must be present in the result object
    pub must_have: Vec<String>,

    /// Keys that must be present, non-null and non-empty
    pub fail_if_empty_fields: Vec<String>,
}

impl StepDefinition {
    /// A plain command step with default flags
    pub fn new(step_id: impl Into<String>, cmd: &[&str]) -> Self {
        Self {
            step_id: step_id.into(),
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
            expect_json: false,
            must_have: Vec::new(),
            fail_if_empty_fields: Vec::new(),
        }
    }

    /// Require a JSON object result
    pub fn expecting_json(mut self) -> Self {
        self.expect_json = true;
        self
    }

    pub fn with_must_have(mut self, keys: &[&str]) -> Self {
        self.must_have = keys.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_non_empty(mut self, keys: &[&str]) -> Self {
        self.fail_if_empty_fields = keys.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Command line as recorded in the ledger and the report
    pub fn command_line(&self) -> String {
        self.cmd.join(" ")
    }
}

/// Step as it appears on disk, every field optional or nullable
#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    step_id: Option<Value>,
    #[serde(default)]
    cmd: Option<Vec<String>>,
    #[serde(default)]
    expect_json: Option<bool>,
    #[serde(default)]
    must_have: Option<Vec<String>>,
    #[serde(default)]
    fail_if_empty_fields: Option<Vec<String>>,
}

impl RawStep {
    fn into_definition(self, default_id: &str) -> StepDefinition {
        let step_id = match self.step_id {
            None | Some(Value::Null) => default_id.to_string(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        };

        StepDefinition {
            step_id,
            cmd: self.cmd.unwrap_or_default(),
            expect_json: self.expect_json.unwrap_or(false),
            must_have: self.must_have.unwrap_or_default(),
            fail_if_empty_fields: self.fail_if_empty_fields.unwrap_or_default(),
        }
    }
}

/// A loaded step list
#[derive(Debug, Clone)]
pub struct StepList {
    pub steps: Vec<StepDefinition>,

    /// First 16 hex chars of the SHA-256 of the file contents
    pub digest: String,
}

impl StepList {
    /// Load a step list from a file; `.yaml`/`.yml` files are parsed as
    /// YAML, anything else as JSON
    pub fn from_file(path: &Path, default_id: &str) -> Result<Self, InputError> {
        let content = std::fs::read_to_string(path).map_err(|source| InputError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            Self::from_yaml(&content, default_id)
        } else {
            Self::from_json(&content, default_id)
        }
    }

    /// Parse a JSON step list
    pub fn from_json(content: &str, default_id: &str) -> Result<Self, InputError> {
        let value: Value = serde_json::from_str(content).map_err(|e| InputError::Parse {
            format: "JSON",
            message: e.to_string(),
        })?;
        Self::from_value(value, content, default_id)
    }

    /// Parse a YAML step list
    pub fn from_yaml(content: &str, default_id: &str) -> Result<Self, InputError> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| InputError::Parse {
            format: "YAML",
            message: e.to_string(),
        })?;
        let value = serde_json::to_value(yaml).map_err(|e| InputError::Parse {
            format: "YAML",
            message: e.to_string(),
        })?;
        Self::from_value(value, content, default_id)
    }

    fn from_value(value: Value, content: &str, default_id: &str) -> Result<Self, InputError> {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("steps") {
                Some(Value::Array(items)) => items,
                _ => return Err(InputError::Shape),
            },
            _ => return Err(InputError::Shape),
        };

        let steps = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value::<RawStep>(item)
                    .map(|raw| raw.into_definition(default_id))
                    .map_err(|source| InputError::Step { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            steps,
            digest: digest(content),
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Short content digest (first 8 bytes of SHA-256, hex encoded)
fn digest(content: &str) -> String {
    let hash = Sha256::digest(content.as_bytes());
    hex::encode(&hash[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bare_list_with_defaults() {
        let list = StepList::from_json(r#"[{"cmd": ["echo", "hi"]}, {}]"#, DEFAULT_STEP_ID).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.steps[0], StepDefinition::new("step", &["echo", "hi"]));
        assert_eq!(list.steps[1].step_id, "step");
        assert!(list.steps[1].cmd.is_empty());
        assert!(!list.steps[1].expect_json);
    }

    #[test]
    fn test_wrapped_list() {
        let json = r#"{"steps": [{
            "step_id": "quality",
            "cmd": ["python", "-m", "quality"],
            "expect_json": true,
            "must_have": ["lint"],
            "fail_if_empty_fields": ["tests"]
        }]}"#;
        let list = StepList::from_json(json, DEFAULT_STEP_ID).unwrap();

        let expected = StepDefinition::new("quality", &["python", "-m", "quality"])
            .expecting_json()
            .with_must_have(&["lint"])
            .with_non_empty(&["tests"]);
        assert_eq!(list.steps, vec![expected]);
        assert_eq!(list.steps[0].command_line(), "python -m quality");
    }

    #[test]
    fn test_nulls_and_numeric_ids() {
        let json = r#"[{"step_id": 7, "cmd": null, "must_have": null}]"#;
        let list = StepList::from_json(json, DEFAULT_ROLLBACK_ID).unwrap();
        assert_eq!(list.steps[0].step_id, "7");
        assert!(list.steps[0].cmd.is_empty());
        assert!(list.steps[0].must_have.is_empty());

        let list = StepList::from_json(r#"[{"step_id": null}]"#, DEFAULT_ROLLBACK_ID).unwrap();
        assert_eq!(list.steps[0].step_id, "rollback");
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(matches!(
            StepList::from_json(r#"{"commands": []}"#, DEFAULT_STEP_ID),
            Err(InputError::Shape)
        ));
        assert!(matches!(
            StepList::from_json(r#"{"steps": {"a": 1}}"#, DEFAULT_STEP_ID),
            Err(InputError::Shape)
        ));
        assert!(matches!(
            StepList::from_json("42", DEFAULT_STEP_ID),
            Err(InputError::Shape)
        ));
        assert!(matches!(
            StepList::from_json(r#"["echo"]"#, DEFAULT_STEP_ID),
            Err(InputError::Step { index: 0, .. })
        ));
        assert!(matches!(
            StepList::from_json("{not json", DEFAULT_STEP_ID),
            Err(InputError::Parse { format: "JSON", .. })
        ));
    }

    #[test]
    fn test_yaml_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("commands.yaml");
        std::fs::write(
            &path,
            r#"
steps:
  - step_id: build
    cmd: [make, all]
  - step_id: report
    cmd: [make, report]
    expect_json: true
"#,
        )
        .unwrap();

        let list = StepList::from_file(&path, DEFAULT_STEP_ID).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.steps[1].step_id, "report");
        assert!(list.steps[1].expect_json);
    }

    #[test]
    fn test_missing_file() {
        let err = StepList::from_file(Path::new("/no/such/commands.json"), DEFAULT_STEP_ID)
            .unwrap_err();
        assert!(matches!(err, InputError::Read { .. }));
    }

    #[test]
    fn test_digest_tracks_content() {
        let a = StepList::from_json("[]", DEFAULT_STEP_ID).unwrap();
        let b = StepList::from_json("[ ]", DEFAULT_STEP_ID).unwrap();
        assert!(a.is_empty());
        assert_eq!(a.digest.len(), 16);
        assert_ne!(a.digest, b.digest);
    }
}
