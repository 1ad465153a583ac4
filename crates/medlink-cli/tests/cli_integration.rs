//! CLI Integration Tests
//!
//! These tests run the `medlink` binary and check its output formats.
//!
//! ```text
//! cargo test --package medlink-cli --test cli_integration
//! ```

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn run_medlink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_medlink"))
        .args(args)
        .output()
        .expect("Failed to run medlink binary")
}

fn run_medlink_with_stdin(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_medlink"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn medlink binary");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(stdin.as_bytes())
        .expect("Failed to write stdin");
    child.wait_with_output().expect("Failed to wait for medlink")
}

#[test]
fn test_help_command() {
    let output = run_medlink(&["--help"]);
    assert!(output.status.success(), "Help should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["simulate", "kinds", "convert", "units", "config", "exec"] {
        assert!(stdout.contains(command), "Help should list {command}");
    }
}

#[test]
fn test_kinds_json() {
    let output = run_medlink(&["kinds", "--format", "json", "--quiet"]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value.as_array().unwrap().len(), 5);
}

#[test]
fn test_convert_command() {
    let output = run_medlink(&["convert", "100", "celsius", "fahrenheit"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "100 CELSIUS = 212 FAHRENHEIT\n"
    );
}

#[test]
fn test_convert_incompatible_units_fails() {
    let output = run_medlink(&["convert", "1", "GRAMS", "CELSIUS"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("GRAMS"), "stderr: {stderr}");
}

#[test]
fn test_config_uses_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "env_mode = \"dev\"\ncommand_capacity = 4\n").unwrap();

    let output = run_medlink(&["config", "--config", path.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("env_mode = \"dev\""));
    assert!(stdout.contains("command_capacity = 4"));
}

#[test]
fn test_exec_from_stdin() {
    let script = concat!(
        "{\"op\": \"createDevice\", \"kind\": \"yuwell\"}\n",
        "{\"op\": \"getDeviceId\", \"key\": \"missing\"}\n",
    );
    let output = run_medlink_with_stdin(&["exec", "--quiet"], script);
    assert!(output.status.success());

    let records: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["result"]["type"], "key");
    assert_eq!(records[1]["error"]["kind"], "INVALID_HANDLE");
}
