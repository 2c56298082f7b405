//! CLI integration tests

use std::process::Command;

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "farmwatch-sampler", "--", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("Host metrics sampler"),
        "Should show description"
    );
    assert!(stdout.contains("--collector-url"), "Should show collector flag");
    assert!(stdout.contains("--config"), "Should show config flag");
    assert!(stdout.contains("--dashboard-url"), "Should show dashboard flag");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = Command::new("cargo")
        .args(["run", "-p", "farmwatch-sampler", "--", "--version"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("farmwatch-sampler"), "Should show binary name");
}

/// Test that an invalid timeout is rejected by argument parsing
#[test]
fn test_invalid_push_timeout() {
    let output = Command::new("cargo")
        .args([
            "run",
            "-p",
            "farmwatch-sampler",
            "--",
            "--push-timeout",
            "soon",
        ])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Non-numeric timeout should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("push-timeout"));
}
