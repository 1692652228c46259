//! Balanced-brace scanner for structured results embedded in noisy output.
//!
//! Commands are expected to print exactly one JSON object somewhere in their
//! stdout, surrounded by arbitrary log lines. The scanner finds the first
//! brace-balanced block and decodes it. A malformed first block is reported
//! as such; the scanner never skips ahead to a later block.

use serde_json::{Map, Value};
use thiserror::Error;

/// A decoded JSON object
pub type JsonObject = Map<String, Value>;

/// Errors produced while scanning text for an object
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("no JSON object found")]
    NoObjectFound,

    #[error("malformed JSON in first object: {0}")]
    MalformedObject(String),
}

/// Return the first well-formed JSON object found in `text`.
///
/// The whole text is tried first; if that does not decode to an object, the
/// first `{ ... }` block (braces inside string literals ignored) is decoded
/// instead.
pub fn extract_first_object(text: &str) -> Result<JsonObject, ScanError> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        return Ok(map);
    }

    let start = text.find('{').ok_or(ScanError::NoObjectFound)?;
    let end = balanced_end(text.as_bytes(), start).ok_or_else(|| {
        ScanError::MalformedObject("unbalanced braces".to_string())
    })?;

    match serde_json::from_str::<Value>(&text[start..end]) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ScanError::MalformedObject(format!(
            "first block is not an object ({})",
            kind_of(&other)
        ))),
        Err(e) => Err(ScanError::MalformedObject(e.to_string())),
    }
}

/// Walk from the opening brace at `start` and return the exclusive end index
/// of the block whose depth returns to zero.
///
/// Structural characters are all ASCII, so byte indices always land on char
/// boundaries.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }

    None
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
