//! Unit tests for storage record types.

use super::*;
use serde_json::json;
use std::fs;

#[test]
fn test_invocation_new() {
    let input = json!({"message": "papers by field"});
    let invocation = Invocation::new("query_paper_data", input.clone());

    assert_eq!(invocation.tool_name, "query_paper_data");
    assert_eq!(invocation.input, input);
    assert!(invocation.success);
    assert!(invocation.session_id.is_none());
    assert!(invocation.output.is_none());
}

#[test]
fn test_invocation_builders() {
    let invocation = Invocation::new("generate_visualization", json!({}))
        .with_session("sess-1")
        .with_pipe("dataviz-orchestrator-v1")
        .success(json!({"success": true}), 42);

    assert_eq!(invocation.session_id.as_deref(), Some("sess-1"));
    assert_eq!(invocation.pipe_name.as_deref(), Some("dataviz-orchestrator-v1"));
    assert_eq!(invocation.latency_ms, Some(42));
    assert!(invocation.success);
}

#[test]
fn test_invocation_failure() {
    let invocation = Invocation::new("query_paper_data", json!({})).failure("timed out", 5000);

    assert!(!invocation.success);
    assert_eq!(invocation.error.as_deref(), Some("timed out"));
    assert_eq!(invocation.latency_ms, Some(5000));
}

#[test]
fn test_paper_record_defaults() {
    let paper: PaperRecord = serde_json::from_value(json!({"paperid": "W1", "year": 2020})).unwrap();

    assert_eq!(paper.cited_by_count, 0);
    assert_eq!(paper.patent_count, 0);
    assert!(!paper.is_retracted);
    assert!(paper.doctype.is_none());
}

#[test]
fn test_bundle_from_dir_requires_papers() {
    let dir = tempfile::tempdir().unwrap();
    let err = DatasetBundle::from_dir(dir.path()).unwrap_err();
    assert!(err.to_string().contains("papers.json"));
}

#[test]
fn test_bundle_from_dir_optional_tables() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("papers.json"),
        r#"[{"paperid": "W1", "year": 2021, "cited_by_count": 3}]"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("fields.json"),
        r#"[{"fieldid": "F1", "display_name": "Medicine"}]"#,
    )
    .unwrap();

    let bundle = DatasetBundle::from_dir(dir.path()).unwrap();
    assert_eq!(bundle.papers.len(), 1);
    assert_eq!(bundle.fields[0].display_name, "Medicine");
    assert!(bundle.paper_fields.is_empty());
    assert!(bundle.patent_links.is_empty());
}

#[test]
fn test_bundle_from_dir_rejects_malformed_json() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("papers.json"), "{not json").unwrap();

    let err = DatasetBundle::from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, crate::error::StorageError::Import { .. }));
}
