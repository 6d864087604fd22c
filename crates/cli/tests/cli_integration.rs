//! CLI integration tests for the `caseflow` subcommands.
//!
//! Uses `assert_cmd` to spawn the `caseflow` binary and verify
//! exit codes, stdout content, and stderr content.
//!
//! All tests set `current_dir` to the workspace root so that relative
//! paths to the fixtures under `crates/cli/tests/fixtures` resolve.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CATALOG: &str = "crates/cli/tests/fixtures/catalog.json";
const PROGRESS: &str = "crates/cli/tests/fixtures/progress.json";
const EVENTS: &str = "crates/cli/tests/fixtures/events.json";

/// Locate the workspace root by walking up from CARGO_MANIFEST_DIR.
fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    // crates/cli -> workspace root is two levels up
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

/// Helper: create a Command for the `caseflow` binary, rooted at workspace.
fn caseflow() -> Command {
    let mut cmd = cargo_bin_cmd!("caseflow");
    cmd.current_dir(workspace_root());
    cmd.env_remove("CASEFLOW_LOG").env_remove("RUST_LOG");
    cmd
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    caseflow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Case workflow progression engine"));
}

#[test]
fn version_exits_0() {
    caseflow()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("caseflow"));
}

#[test]
fn unknown_subcommand_fails() {
    caseflow().arg("frobnicate").assert().failure();
}

// ──────────────────────────────────────────────
// 2. Validate subcommand
// ──────────────────────────────────────────────

#[test]
fn validate_valid_catalog_reports_counts() {
    caseflow()
        .args(["validate", CATALOG])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid (2 worlds, 9 steps)"));
}

#[test]
fn validate_json_output() {
    let output = caseflow()
        .args(["--output", "json", "validate", CATALOG])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["valid"], true);
    assert_eq!(json["worlds"], 2);
    assert_eq!(json["steps"], 9);
}

#[test]
fn validate_schema_violation_exits_1() {
    caseflow()
        .args(["validate", "crates/cli/tests/fixtures/catalog_bad_schema.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid catalog"))
        .stderr(predicate::str::contains("order"));
}

#[test]
fn validate_graph_violation_exits_1() {
    caseflow()
        .args(["validate", "crates/cli/tests/fixtures/catalog_bad_graph.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("nowhere"));
}

#[test]
fn validate_graph_violation_json_lists_errors() {
    let output = caseflow()
        .args([
            "--output",
            "json",
            "validate",
            "crates/cli/tests/fixtures/catalog_bad_graph.json",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let json: serde_json::Value = serde_json::from_slice(&output.stderr).expect("valid JSON");
    assert_eq!(json["valid"], false);
    assert_eq!(json["errors"].as_array().map(Vec::len), Some(1));
}

#[test]
fn validate_missing_file_exits_1() {
    caseflow()
        .args(["validate", "does/not/exist.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error reading file"));
}

#[test]
fn validate_malformed_json_exits_1() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ \"worlds\": [").unwrap();

    caseflow()
        .args(["validate", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error parsing JSON"));
}

#[test]
fn validate_quiet_prints_nothing() {
    caseflow()
        .args(["--quiet", "validate", CATALOG])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn validate_detects_undeclared_loop() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("loop.json");
    fs::write(
        &path,
        r#"{"worlds": [{"id": "w", "name": "W", "steps": [
            {"id": "a", "order": 1, "name": "A", "next_step_id": "b"},
            {"id": "b", "order": 2, "name": "B", "next_step_id": "a"}
        ]}]}"#,
    )
    .unwrap();

    caseflow()
        .args(["validate", path.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid catalog"));
}

// ──────────────────────────────────────────────
// 3. Steps subcommand
// ──────────────────────────────────────────────

#[test]
fn steps_lists_world_in_order() {
    let output = caseflow()
        .args(["steps", CATALOG, "--world", "claims"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    let intake = stdout.find("intake").expect("intake listed");
    let assess = stdout.find("assess").expect("assess listed");
    let refusal = stdout.find("refusal").expect("refusal listed");
    assert!(intake < assess && assess < refusal);
    assert!(stdout.contains("yes -> payout, no -> refusal"));
    assert!(stdout.contains("optional"));
}

#[test]
fn steps_json_output_carries_templates() {
    let output = caseflow()
        .args(["--output", "json", "steps", CATALOG, "--world", "repair"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(json["world"], "repair");
    let steps = json["steps"].as_array().expect("steps array");
    assert_eq!(steps.len(), 4);
    assert_eq!(steps[2]["id"], "approve");
    assert_eq!(steps[2]["can_loop_back"], true);
    assert_eq!(steps[2]["world_id"], "repair");
}

#[test]
fn steps_unknown_world_exits_1() {
    caseflow()
        .args(["steps", CATALOG, "--world", "marine"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("marine"));
}

#[test]
fn steps_requires_world_flag() {
    caseflow().args(["steps", CATALOG]).assert().failure();
}

// ──────────────────────────────────────────────
// 4. Timeline subcommand
// ──────────────────────────────────────────────

#[test]
fn timeline_json_places_events_and_lists_recent_first() {
    let output = caseflow()
        .args([
            "--output", "json", "timeline", CATALOG, "--progress", PROGRESS, "--events", EVENTS,
            "--case", "case-1",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");

    let entries = json["entries"].as_array().expect("entries array");
    let names: Vec<&str> = entries
        .iter()
        .map(|e| e["step_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Assess claim", "Collect documents", "Intake"]);

    let ids = |i: usize| -> Vec<String> {
        entries[i]["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["id"].as_str().unwrap().to_string())
            .collect()
    };
    assert_eq!(ids(0), vec!["a-visit"]);
    assert_eq!(ids(1), vec!["t-invoice"]);
    // The document names its step explicitly; newest first within the step.
    assert_eq!(ids(2), vec!["d-form", "c-early"]);

    assert_eq!(entries[0]["position"], 3);
    assert!(json["unassigned"].as_array().unwrap().is_empty());
}

#[test]
fn timeline_text_output() {
    caseflow()
        .args([
            "timeline", CATALOG, "--progress", PROGRESS, "--events", EVENTS, "--case", "case-1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Assess claim [in_progress]"))
        .stdout(predicate::str::contains("comment c-early"));
}

#[test]
fn timeline_without_events_file() {
    let output = caseflow()
        .args([
            "--output", "json", "timeline", CATALOG, "--progress", PROGRESS, "--case", "case-2",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["step_name"], "Inspect");
}

#[test]
fn timeline_multiple_cases_require_case_flag() {
    caseflow()
        .args(["timeline", CATALOG, "--progress", PROGRESS])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--case"));
}

#[test]
fn timeline_bad_progress_file_reports_json_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rows.json");
    fs::write(&path, r#"[{"id": "one"}]"#).unwrap();

    let output = caseflow()
        .args([
            "--output",
            "json",
            "timeline",
            CATALOG,
            "--progress",
            path.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let json: serde_json::Value = serde_json::from_slice(&output.stderr).expect("valid JSON");
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("invalid progress file"));
}

// ──────────────────────────────────────────────
// 5. Serve configuration errors
// ──────────────────────────────────────────────

#[test]
fn serve_without_catalog_exits_1() {
    caseflow()
        .env_remove("CASEFLOW_API_KEY")
        .env_remove("CASEFLOW_RATE_LIMIT")
        .arg("serve")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no catalog given"));
}

#[test]
fn serve_with_unreadable_config_exits_1() {
    caseflow()
        .args(["serve", "--config", "does/not/exist.toml"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("could not read"));
}

#[test]
fn serve_with_invalid_catalog_exits_1() {
    caseflow()
        .env_remove("CASEFLOW_API_KEY")
        .env_remove("CASEFLOW_RATE_LIMIT")
        .args([
            "serve",
            "--port",
            "0",
            "--catalog",
            "crates/cli/tests/fixtures/catalog_bad_graph.json",
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Server error"));
}
