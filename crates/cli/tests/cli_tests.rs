// SPDX-License-Identifier: Apache-2.0

//! Integration tests for CLI command parsing (no daemon required).

use std::process::Command;

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .arg("run")
        .arg("-p")
        .arg("loudness-cli")
        .arg("--")
        .args(args)
        .output()
        .expect("Failed to execute CLI")
}

#[test]
fn test_cli_help() {
    let output = run_cli(&["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Loudness Balancer command-line interface"));
    assert!(stdout.contains("status"));
    assert!(stdout.contains("stream"));
    assert!(stdout.contains("auto-balance"));
    assert!(stdout.contains("limiter"));
}

#[test]
fn test_cli_version() {
    let output = run_cli(&["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("loudness-cli"));
}

#[test]
fn test_stream_help() {
    let output = run_cli(&["stream", "--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("list"));
    assert!(stdout.contains("register"));
    assert!(stdout.contains("remove"));
    assert!(stdout.contains("gain"));
}

#[test]
fn test_limiter_help() {
    let output = run_cli(&["limiter", "--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("get"));
    assert!(stdout.contains("set"));
}

#[test]
fn test_daemon_url_flag() {
    let output = run_cli(&["--daemon", "http://localhost:9999", "status"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to send request") || stderr.contains("connect"));
}

#[test]
fn test_invalid_command() {
    let output = run_cli(&["invalid-command"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unrecognized subcommand") || stderr.contains("error"));
}

#[test]
fn test_stream_gain_requires_id_and_value() {
    let output = run_cli(&["stream", "gain"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("required") || stderr.contains("argument"));
}
