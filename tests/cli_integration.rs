//! CLI Integration Tests
//!
//! These tests verify that the CLI commands work correctly end-to-end.
//! They test the actual binary behavior, not just the library.
//!
//! Run with:
//! ```bash
//! cargo test --test cli_integration
//! ```

use std::process::Command;
use tempfile::tempdir;

/// Run bloomtree against a store and return (stdout, stderr, success)
fn run_bloomtree(args: &[&str], store: &str) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_bloomtree"))
        .args(["-s", store, "-f", "json"])
        .args(args)
        .output()
        .expect("Failed to execute bloomtree");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

/// Run a command that must succeed and parse its JSON output
fn run_json(args: &[&str], store: &str) -> serde_json::Value {
    let (stdout, stderr, success) = run_bloomtree(args, store);
    assert!(success, "{:?} failed: {}", args, stderr);
    serde_json::from_str(stdout.trim()).expect("output should be JSON")
}

fn strings(value: &serde_json::Value) -> Vec<String> {
    let mut out: Vec<String> = value
        .as_array()
        .expect("expected an array")
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    out.sort();
    out
}

// ============================================================================
// Store Initialization Tests
// ============================================================================

#[test]
fn test_cli_init_creates_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = path.to_str().unwrap();

    let (stdout, _stderr, success) = run_bloomtree(&["init"], store);

    assert!(success, "init should succeed");
    assert!(stdout.contains("status"), "should return JSON with status");
    assert!(stdout.contains("ok"), "status should be ok");
    assert!(path.exists(), "store file should be created");
}

#[test]
fn test_cli_default_store_path() {
    let output = Command::new(env!("CARGO_BIN_EXE_bloomtree"))
        .args(["--help"])
        .output()
        .expect("Failed to execute bloomtree");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("[default: bloomtree.db]"),
        "Default store path should be bloomtree.db, got: {}",
        stdout
    );
}

// ============================================================================
// Sequence Tests
// ============================================================================

#[test]
fn test_cli_seq_push_and_list() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = path.to_str().unwrap();

    for value in ["a", "b", "c", "d"] {
        let out = run_json(&["seq", "push", "letters", value], store);
        assert_eq!(out["status"], "ok");
    }

    let out = run_json(&["seq", "list", "letters"], store);
    assert_eq!(out["values"], serde_json::json!(["a", "b", "c", "d"]));

    let out = run_json(&["seq", "count", "letters"], store);
    assert_eq!(out["count"], 4);
}

#[test]
fn test_cli_seq_insert_get_remove() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = path.to_str().unwrap();

    run_json(&["seq", "insert", "s", "0", "c"], store);
    run_json(&["seq", "insert", "s", "0", "a"], store);
    run_json(&["seq", "insert", "s", "1", "b"], store);

    let out = run_json(&["seq", "get", "s", "1"], store);
    assert_eq!(out["value"], "b");

    let out = run_json(&["seq", "remove", "s", "0"], store);
    assert_eq!(out["count"], 2);

    let out = run_json(&["seq", "list", "s"], store);
    assert_eq!(out["values"], serde_json::json!(["b", "c"]));
}

#[test]
fn test_cli_seq_out_of_bounds() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = path.to_str().unwrap();

    run_json(&["seq", "push", "s", "only"], store);

    let (_stdout, stderr, success) = run_bloomtree(&["seq", "get", "s", "5"], store);
    assert!(!success, "reading past the end should fail");
    assert!(stderr.contains("out of bounds"), "got: {}", stderr);

    let (_stdout, _stderr, success) = run_bloomtree(&["seq", "insert", "s", "3", "x"], store);
    assert!(!success, "inserting past the end should fail");
}

#[test]
fn test_cli_missing_sequence_is_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = path.to_str().unwrap();

    let out = run_json(&["seq", "count", "nothing"], store);
    assert_eq!(out["count"], 0);
}

// ============================================================================
// Set Tests
// ============================================================================

#[test]
fn test_cli_set_find_by_word_and_count() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = path.to_str().unwrap();

    for text in ["one", "one two", "one two three", "one two three four"] {
        let out = run_json(&["set", "add", "numbers", text], store);
        assert_eq!(out["status"], "ok");
    }

    let out = run_json(&["set", "find", "numbers", "four"], store);
    assert_eq!(strings(&out["matches"]), vec!["one two three four"]);

    let out = run_json(&["set", "find", "numbers", "two"], store);
    assert_eq!(
        strings(&out["matches"]),
        vec!["one two", "one two three", "one two three four"]
    );

    let out = run_json(&["set", "find", "numbers", "--count", "3"], store);
    assert_eq!(strings(&out["matches"]), vec!["one two three"]);
}

#[test]
fn test_cli_set_remove() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = path.to_str().unwrap();

    run_json(&["set", "add", "s", "red apple"], store);
    run_json(&["set", "add", "s", "green apple"], store);

    let out = run_json(&["set", "remove", "s", "red apple"], store);
    assert_eq!(out["len"], 1);

    let out = run_json(&["set", "find", "s", "apple"], store);
    assert_eq!(strings(&out["matches"]), vec!["green apple"]);
}

#[test]
fn test_cli_set_find_requires_query() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = path.to_str().unwrap();

    let (_stdout, _stderr, success) = run_bloomtree(&["set", "find", "s"], store);
    assert!(!success, "find without a word or --count should fail");
}

// ============================================================================
// Roots and Persistence Tests
// ============================================================================

#[test]
fn test_cli_roots_lists_named_trees() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = path.to_str().unwrap();

    run_json(&["seq", "push", "todo", "write tests"], store);
    run_json(&["set", "add", "notes", "hello world"], store);

    let out = run_json(&["roots"], store);
    let names: Vec<&str> = out
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["seq/todo", "set/notes"]);
}

#[test]
fn test_cli_config_changes_filter_geometry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = path.to_str().unwrap();
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{ "filter_bytes": 64, "filter_hashes": 4 }"#).unwrap();
    let config = config.to_str().unwrap();

    run_json(&["-c", config, "set", "add", "s", "wide filters"], store);

    let out = run_json(&["-c", config, "set", "find", "s", "wide"], store);
    assert_eq!(strings(&out["matches"]), vec!["wide filters"]);

    // Default-sized queries do not match 64 byte filters
    let out = run_json(&["set", "find", "s", "wide"], store);
    assert!(strings(&out["matches"]).is_empty());
}

#[test]
fn test_cli_bad_config_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = path.to_str().unwrap();
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{ "filter_bytes": 0 }"#).unwrap();

    let (_stdout, stderr, success) =
        run_bloomtree(&["-c", config.to_str().unwrap(), "seq", "count", "s"], store);
    assert!(!success);
    assert!(stderr.contains("config"), "got: {}", stderr);
}

#[test]
fn test_cli_roots_rm_forgets_name() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = path.to_str().unwrap();

    run_json(&["seq", "push", "a", "x"], store);
    run_json(&["seq", "push", "b", "y"], store);

    let out = run_json(&["roots", "rm", "seq/a"], store);
    assert_eq!(out["status"], "ok");

    let out = run_json(&["roots"], store);
    assert_eq!(out.as_array().unwrap().len(), 1);
    assert_eq!(out[0]["name"], "seq/b");

    let out = run_json(&["seq", "count", "a"], store);
    assert_eq!(out["count"], 0);

    let (_stdout, stderr, success) = run_bloomtree(&["roots", "rm", "seq/a"], store);
    assert!(!success, "removing an unknown root should fail");
    assert!(stderr.contains("seq/a"), "got: {}", stderr);
}

#[test]
fn test_cli_reads_earlier_root() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = path.to_str().unwrap();

    run_json(&["seq", "push", "s", "first"], store);
    let old = run_json(&["seq", "push", "s", "second"], store)["root"]
        .as_str()
        .unwrap()
        .to_string();
    run_json(&["seq", "remove", "s", "0"], store);

    let out = run_json(&["seq", "list", "s"], store);
    assert_eq!(out["values"], serde_json::json!(["second"]));
    let out = run_json(&["seq", "list", "s", "--at", &old], store);
    assert_eq!(out["values"], serde_json::json!(["first", "second"]));

    let old = run_json(&["set", "add", "t", "kept text"], store)["root"]
        .as_str()
        .unwrap()
        .to_string();
    run_json(&["set", "remove", "t", "kept text"], store);
    let out = run_json(&["set", "find", "t", "kept", "--at", &old], store);
    assert_eq!(strings(&out["matches"]), vec!["kept text"]);

    let (_stdout, stderr, success) =
        run_bloomtree(&["seq", "list", "s", "--at", "not-hex"], store);
    assert!(!success);
    assert!(stderr.contains("Invalid root hash"), "got: {}", stderr);
}

#[test]
fn test_cli_text_format_prints_lines() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let store = path.to_str().unwrap();

    let text = |args: &[&str]| {
        let output = Command::new(env!("CARGO_BIN_EXE_bloomtree"))
            .args(["-s", store, "-f", "text"])
            .args(args)
            .output()
            .expect("Failed to execute bloomtree");
        assert!(output.status.success());
        String::from_utf8_lossy(&output.stdout).to_string()
    };

    let stdout = text(&["seq", "count", "s"]);
    assert!(stdout.lines().any(|l| l == "count: 0"), "got: {}", stdout);
    assert!(stdout.lines().any(|l| l == "name: s"), "got: {}", stdout);
    assert!(!stdout.contains('{'), "got: {}", stdout);

    text(&["seq", "push", "s", "hello world"]);
    let stdout = text(&["seq", "list", "s"]);
    assert!(stdout.lines().any(|l| l == "values:"), "got: {}", stdout);
    assert!(stdout.lines().any(|l| l == "  hello world"), "got: {}", stdout);

    let stdout = text(&["roots"]);
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.trim_end().ends_with("  seq/s"), "got: {}", stdout);
}
