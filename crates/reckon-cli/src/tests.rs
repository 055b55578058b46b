//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;

use clap::Parser;
use tempfile::NamedTempFile;

use crate::cli::{Cli, Commands};
use crate::commands;

fn snapshot_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_merge_command() {
    let cli = Cli::try_parse_from([
        "reckon", "merge", "--manual", "m.json", "--scanned", "s.json", "--json", "--summary",
    ])
    .unwrap();

    match cli.command {
        Commands::Merge {
            manual,
            scanned,
            json,
            summary,
        } => {
            assert_eq!(manual.to_str(), Some("m.json"));
            assert_eq!(scanned.to_str(), Some("s.json"));
            assert!(json);
            assert!(summary);
        }
        _ => panic!("expected merge command"),
    }
}

#[test]
fn test_parse_watch_default_interval() {
    let cli = Cli::try_parse_from([
        "reckon", "watch", "--manual", "m.json", "--scanned", "s.json",
    ])
    .unwrap();

    match cli.command {
        Commands::Watch { interval, .. } => assert_eq!(interval, 2),
        _ => panic!("expected watch command"),
    }
}

#[test]
fn test_merge_requires_both_files() {
    assert!(Cli::try_parse_from(["reckon", "merge", "--manual", "m.json"]).is_err());
}

// ========== Snapshot Loading Tests ==========

#[test]
fn test_load_snapshot_reads_documents() {
    let file = snapshot_file(
        r#"[{"id": "abc", "title": "Coffee", "amount": 4.5},
            {"title": "Bagel", "amount": 3.0}]"#,
    );

    let records = commands::load_snapshot(file.path()).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "abc");
    // Documents without an id get their array index
    assert_eq!(records[1].id, "1");
    assert_eq!(records[0].str_field(&["title"]), Some("Coffee"));
}

#[test]
fn test_load_snapshot_rejects_non_arrays() {
    let file = snapshot_file(r#"{"title": "not a list"}"#);
    assert!(commands::load_snapshot(file.path()).is_err());
}

#[test]
fn test_load_snapshot_missing_file() {
    let result = commands::load_snapshot(std::path::Path::new("/nonexistent/snap.json"));
    assert!(result.is_err());
}

// ========== Command Tests ==========

#[test]
fn test_cmd_merge_end_to_end() {
    let manual = snapshot_file(
        r#"[{"id": "m1", "title": "Swiggy order", "amount": 250, "date": "2024-05-01"}]"#,
    );
    let scanned = snapshot_file(
        r#"[{"id": "s1", "merchantName": "Receipt from Swiggy", "totalAmount": 250.00,
             "createdAt": "2024-05-01T19:00:00Z"}]"#,
    );

    let config = commands::load_config(None).unwrap();
    let result = commands::cmd_merge(&config, manual.path(), scanned.path(), false, true);
    assert!(result.is_ok());
}

#[test]
fn test_cmd_merge_json_output() {
    let manual = snapshot_file(r#"[{"id": "m1", "title": "Coffee", "amount": 4.5, "date": "2024-05-01"}]"#);
    let scanned = snapshot_file("[]");

    let config = commands::load_config(None).unwrap();
    let result = commands::cmd_merge(&config, manual.path(), scanned.path(), true, false);
    assert!(result.is_ok());
}

#[test]
fn test_load_config_from_file() {
    let config_file = snapshot_file("similarity_threshold = 0.85\n");
    let config = commands::load_config(Some(config_file.path())).unwrap();
    assert_eq!(config.similarity_threshold, 0.85);
}

#[test]
fn test_load_config_rejects_garbage() {
    let config_file = snapshot_file("similarity_threshold = \"very\"\n");
    assert!(commands::load_config(Some(config_file.path())).is_err());
}
