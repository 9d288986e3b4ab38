//! Basic CLI E2E tests.
//!
//! Each test runs the binary against its own HOME so the data directory,
//! config file and SQLite queue start empty.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_campusync-cli"))
        .args(args)
        .env("HOME", home)
        .env_remove("CAMPUSYNC_ENV")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_queue_add_list_remove() {
    let home = tempfile::TempDir::new().unwrap();
    let (id, _, code) = run_cli(
        home.path(),
        &["queue", "add", "create-project", "--data", r#"{"name":"Thesis"}"#],
    );
    assert_eq!(code, 0);
    let id = id.trim().to_string();
    assert!(id.contains('-'));

    let (out, _, code) = run_cli(home.path(), &["queue", "list", "--json"]);
    assert_eq!(code, 0);
    let entries: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(entries[0]["id"], id.as_str());
    assert_eq!(entries[0]["data"]["name"], "Thesis");

    let (_, _, code) = run_cli(home.path(), &["queue", "remove", &id]);
    assert_eq!(code, 0);
    let (out, _, _) = run_cli(home.path(), &["queue", "list"]);
    assert!(out.contains("queue is empty"));
}

#[test]
fn test_queue_add_rejects_bad_json() {
    let home = tempfile::TempDir::new().unwrap();
    let (_, err, code) = run_cli(home.path(), &["queue", "add", "x", "--data", "{nope"]);
    assert_eq!(code, 1);
    assert!(err.contains("error:"));
}

#[test]
fn test_config_set_persists() {
    let home = tempfile::TempDir::new().unwrap();
    let (_, _, code) = run_cli(home.path(), &["config", "set", "cache.version", "v9"]);
    assert_eq!(code, 0);
    let (out, _, code) = run_cli(home.path(), &["config", "get", "cache.version"]);
    assert_eq!(code, 0);
    assert_eq!(out.trim(), "v9");

    let (_, _, code) = run_cli(home.path(), &["config", "get", "cache.nope"]);
    assert_eq!(code, 1);
}

#[test]
fn test_prompt_dismiss_hides_prompt() {
    let home = tempfile::TempDir::new().unwrap();
    let (out, _, _) = run_cli(home.path(), &["prompt", "status"]);
    assert!(out.contains("Show prompt:    yes"));
    run_cli(home.path(), &["prompt", "dismiss"]);
    let (out, _, _) = run_cli(home.path(), &["prompt", "status"]);
    assert!(out.contains("Show prompt:    no"));
}

#[test]
fn test_fetch_offline_api_returns_offline_json() {
    let home = tempfile::TempDir::new().unwrap();
    run_cli(home.path(), &["config", "set", "network.origin", "http://127.0.0.1:9"]);
    let (out, _, code) = run_cli(home.path(), &["fetch", "/api/projects", "--offline"]);
    assert_eq!(code, 0);
    assert!(out.starts_with("503 (synthesized)"));
    assert!(out.contains(r#""offline":true"#));
}

#[test]
fn test_sync_status_reports_probe_result_only() {
    let home = tempfile::TempDir::new().unwrap();
    run_cli(home.path(), &["config", "set", "network.origin", "http://127.0.0.1:9"]);
    let (out, _, code) = run_cli(home.path(), &["sync", "status", "--json"]);
    assert_eq!(code, 0);
    let status: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(status["connection_status"], "offline");
    assert_eq!(status["pending_action_count"], 0);
    assert!(status.get("last_online").is_none());
}
