//! Scanner Integration Tests
//!
//! First-object extraction from realistic command output.

use execloop::core::{extract_first_object, ScanError};
use serde_json::json;

#[test]
fn test_object_surrounded_by_logs() {
    let stdout = "INFO starting\n{\"a\": 1, \"b\": [1, 2]}\nINFO done\n";

    let obj = extract_first_object(stdout).unwrap();
    assert_eq!(obj.get("a"), Some(&json!(1)));
    assert_eq!(obj.get("b"), Some(&json!([1, 2])));
}

#[test]
fn test_first_of_two_objects_wins() {
    let obj = extract_first_object("{\"first\": true} then {\"second\": true}").unwrap();
    assert!(obj.contains_key("first"));
    assert!(!obj.contains_key("second"));
}

#[test]
fn test_nested_object_returned_whole() {
    let stdout = "result: {\"outer\": {\"inner\": {\"n\": 3}}, \"tail\": \"}\"} trailing";

    let obj = extract_first_object(stdout).unwrap();
    assert_eq!(obj["outer"]["inner"]["n"], json!(3));
    assert_eq!(obj["tail"], json!("}"));
}

#[test]
fn test_malformed_first_block_is_not_skipped() {
    let err = extract_first_object("noise\n{bad: json}\nend").unwrap_err();
    assert!(matches!(err, ScanError::MalformedObject(_)));

    // A later valid object does not rescue a malformed first block
    let err = extract_first_object("noise\n{bad: json}\n{\"ok\": 1}").unwrap_err();
    assert!(matches!(err, ScanError::MalformedObject(_)));
}

#[test]
fn test_no_brace_at_all() {
    assert_eq!(
        extract_first_object("plain text, nothing structured"),
        Err(ScanError::NoObjectFound)
    );
    assert_eq!(extract_first_object(""), Err(ScanError::NoObjectFound));
}

#[test]
fn test_crlf_output() {
    let stdout = "line one\r\n{\r\n  \"status\": \"ok\"\r\n}\r\n";

    let obj = extract_first_object(stdout).unwrap();
    assert_eq!(obj["status"], json!("ok"));
}

#[test]
fn test_whole_text_object_with_whitespace() {
    let obj = extract_first_object("  \n{\"k\": null}\n\n").unwrap();
    assert_eq!(obj.get("k"), Some(&json!(null)));
}
