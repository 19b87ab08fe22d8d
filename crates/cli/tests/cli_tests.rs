//! CLI integration tests

use std::process::Command;

fn migctl(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-p", "migctl", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = migctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("MIG GPU partitioner"), "Should show app name");
    assert!(stdout.contains("plan"), "Should show plan command");
    assert!(stdout.contains("geometries"), "Should show geometries command");
    assert!(stdout.contains("inspect"), "Should show inspect command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = migctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("migctl"), "Should show binary name");
}

/// Test plan subcommand help
#[test]
fn test_plan_help() {
    let output = migctl(&["plan", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "plan help should succeed");
    assert!(stdout.contains("--nodes"), "Should show nodes option");
    assert!(stdout.contains("--pods"), "Should show pods option");
    assert!(stdout.contains("--scheduled"), "Should show scheduled option");
    assert!(stdout.contains("--timeout"), "Should show timeout option");
}

/// Test geometries subcommand help
#[test]
fn test_geometries_help() {
    let output = migctl(&["geometries", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "geometries help should succeed");
    assert!(stdout.contains("MODEL"), "Should show model argument");
}

/// Test format and api-url options are listed
#[test]
fn test_global_options() {
    let output = migctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("table"), "Should list table format");
    assert!(stdout.contains("json"), "Should list json format");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("MIGCTL_API_URL"), "Should show env var");
}

/// Test inspect runs locally without a service
#[test]
fn test_inspect_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let nodes = dir.path().join("nodes.json");
    std::fs::write(
        &nodes,
        r#"[{"metadata": {
            "name": "node-1",
            "labels": {"nvidia.com/gpu.product": "NVIDIA-A30", "nvidia.com/gpu.count": "1"},
            "annotations": {"n8s.nebuly.ai/status-gpu-0-4g.24gb-free": "1"}
        }}]"#,
    )
    .unwrap();

    let output = migctl(&["--format", "json", "inspect", "--nodes", nodes.to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "inspect should succeed");
    let rows: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(rows[0]["node"], "node-1");
    assert_eq!(rows[0]["free"], "1x4g.24gb");
    assert_eq!(rows[0]["state"], "free");
}

/// Test invalid command fails
#[test]
fn test_invalid_command() {
    let output = migctl(&["invalid-command"]);
    assert!(!output.status.success(), "Invalid command should fail");
}

/// Test missing required option fails
#[test]
fn test_missing_argument() {
    let output = migctl(&["plan", "--nodes", "nodes.json"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Missing --pods should fail");
    assert!(stderr.contains("--pods"), "Should mention the missing option");
}
