//! Failure isolation, missing sources and cancellation

use super::{write_bulletin, year_block};
use crate::config::IdeamConfig;
use crate::error::IdeamError;
use crate::processor::BatchProcessor;
use std::fs;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn config() -> IdeamConfig {
    IdeamConfig::default().without_progress().with_workers(2)
}

#[tokio::test]
async fn test_malformed_header_skips_only_that_file() {
    let temp_dir = TempDir::new().unwrap();
    write_bulletin(temp_dir.path(), "good.txt", &[year_block(12345678, 1990).every_day(1.0)]);
    let bad = write_bulletin(
        temp_dir.path(),
        "bad.txt",
        &[year_block(87654321, 1990).elevation("ABCDE").every_day(1.0)],
    );

    let outcome = BatchProcessor::new(temp_dir.path().to_path_buf())
        .unwrap()
        .with_config(config())
        .merge()
        .await
        .unwrap();

    assert_eq!(outcome.stats.files_processed, 1);
    assert_eq!(outcome.stats.files_failed, 1);
    assert!(outcome.database.contains(12345678));
    assert!(!outcome.database.contains(87654321));

    assert_eq!(outcome.failures.len(), 1);
    let failure = &outcome.failures[0];
    assert_eq!(failure.path, bad);
    // Leading blank line, then the sentinel, so the elevation line is line 10
    assert_eq!(failure.line, Some(10));
    assert!(failure.reason.contains("elevation"));
}

#[tokio::test]
async fn test_file_without_sentinel_contributes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("notes.txt"), "not a bulletin\nat all\n").unwrap();

    let outcome = BatchProcessor::new(temp_dir.path().to_path_buf())
        .unwrap()
        .with_config(config())
        .merge()
        .await
        .unwrap();

    assert!(outcome.failures.is_empty());
    assert!(outcome.database.is_empty());
    assert_eq!(outcome.stats.files_processed, 1);
}

#[tokio::test]
async fn test_truncated_trailing_block_is_ignored() {
    let temp_dir = TempDir::new().unwrap();
    // A complete block, then a sentinel and station line cut off by EOF
    let mut lines = year_block(12345678, 1990).every_day(1.0).lines();
    lines.extend(year_block(99999999, 1991).lines().into_iter().take(5));
    let text: String = lines.iter().map(|line| format!("{}\n", line)).collect();
    fs::write(temp_dir.path().join("cut.txt"), text).unwrap();

    let outcome = BatchProcessor::new(temp_dir.path().to_path_buf())
        .unwrap()
        .with_config(config())
        .merge()
        .await
        .unwrap();

    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
    assert_eq!(outcome.stats.files_processed, 1);
    assert_eq!(outcome.stats.files_failed, 0);
    assert_eq!(outcome.stats.values_written, 365);
    assert!(outcome.database.contains(12345678));
    assert!(!outcome.database.contains(99999999));
}

#[tokio::test]
async fn test_implausible_year_fails_the_file() {
    let temp_dir = TempDir::new().unwrap();
    write_bulletin(temp_dir.path(), "good.txt", &[year_block(12345678, 1990).every_day(1.0)]);
    write_bulletin(temp_dir.path(), "corrupt.txt", &[year_block(87654321, 99999).every_day(1.0)]);

    let outcome = BatchProcessor::new(temp_dir.path().to_path_buf())
        .unwrap()
        .with_config(config())
        .merge()
        .await
        .unwrap();

    assert_eq!(outcome.stats.files_failed, 1);
    assert!(!outcome.database.contains(87654321));
    let failure = &outcome.failures[0];
    // Leading blank line, then the sentinel, so the station line is line 6
    assert_eq!(failure.line, Some(6));
    assert!(failure.reason.contains("invalid year"));
    assert!(failure.reason.contains("99999"));
}

#[test]
fn test_missing_source_directory() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nowhere");

    match BatchProcessor::new(missing.clone()) {
        Err(IdeamError::SourceNotFound { path }) => assert_eq!(path, missing),
        other => panic!("Expected SourceNotFound, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_invalid_pattern_is_a_configuration_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = BatchProcessor::new(temp_dir.path().to_path_buf())
        .unwrap()
        .with_config(config().with_file_pattern("[txt"))
        .merge()
        .await;

    match result {
        Err(IdeamError::Configuration { message }) => assert!(message.contains("[txt")),
        other => panic!("Expected Configuration error, got {:?}", other.map(|o| o.stats)),
    }
}

#[tokio::test]
async fn test_cancelled_before_start_leaves_every_file_pending() {
    let temp_dir = TempDir::new().unwrap();
    let a = write_bulletin(temp_dir.path(), "a.txt", &[year_block(12345678, 1990)]);
    let b = write_bulletin(temp_dir.path(), "b.txt", &[year_block(12345678, 1991)]);

    let token = CancellationToken::new();
    token.cancel();

    let outcome = BatchProcessor::new(temp_dir.path().to_path_buf())
        .unwrap()
        .with_config(config())
        .with_cancellation(token)
        .merge()
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.pending_files, vec![a, b]);
    assert!(outcome.database.is_empty());
    assert_eq!(outcome.stats.values_written, 0);
}
