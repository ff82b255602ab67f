//! Tests for context builder

use std::fs;
use tempfile::TempDir;
use toolloop_agent::{ContextBuilder, DEFAULT_SYSTEM_PROMPT};

#[tokio::test]
async fn test_default_prompt_without_docs() {
    let prompt = ContextBuilder::new().build_system_prompt().await;
    assert_eq!(
        prompt,
        format!("{}\n\nReference Documentation:\n", DEFAULT_SYSTEM_PROMPT)
    );
}

#[tokio::test]
async fn test_prompt_override() {
    let prompt = ContextBuilder::new()
        .with_prompt(Some("Be brief.".to_string()))
        .build_system_prompt()
        .await;
    assert!(prompt.starts_with("Be brief.\n\nReference Documentation:\n"));
    assert!(!prompt.contains("analyze_storage"));
}

#[tokio::test]
async fn test_docs_loaded_in_sorted_order() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("b.md"), "second").unwrap();
    fs::write(temp_dir.path().join("a.md"), "first").unwrap();
    fs::create_dir(temp_dir.path().join("nested")).unwrap();

    let prompt = ContextBuilder::new()
        .with_prompt(Some("P".to_string()))
        .with_doc_dirs([temp_dir.path()])
        .build_system_prompt()
        .await;

    assert_eq!(prompt, "P\n\nReference Documentation:\nfirst\n\nsecond");
}

#[tokio::test]
async fn test_multiple_dirs_and_missing_dir_skipped() {
    let disputes = TempDir::new().unwrap();
    let scanlines = TempDir::new().unwrap();
    fs::write(disputes.path().join("codes.txt"), "reason codes").unwrap();
    fs::write(scanlines.path().join("format.txt"), "scanline format").unwrap();
    let missing = disputes.path().join("does_not_exist");

    let prompt = ContextBuilder::new()
        .with_prompt(Some("P".to_string()))
        .with_doc_dirs([disputes.path(), missing.as_path(), scanlines.path()])
        .build_system_prompt()
        .await;

    assert_eq!(
        prompt,
        "P\n\nReference Documentation:\nreason codes\n\nscanline format"
    );
}

#[tokio::test]
async fn test_load_docs_missing_dir() {
    let builder = ContextBuilder::new();
    let result = builder
        .load_docs(std::path::Path::new("/nonexistent/toolloop/docs"))
        .await
        .unwrap();
    assert!(result.is_none());
}
