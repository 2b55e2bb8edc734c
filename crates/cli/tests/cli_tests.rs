//! CLI integration tests

use std::process::Command;

fn k6ctl(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "k6ctl", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = k6ctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("k6 load tests"), "Should show about text");
    assert!(stdout.contains("deploy"), "Should show deploy command");
    assert!(stdout.contains("cleanup"), "Should show cleanup command");
    assert!(stdout.contains("compare"), "Should show compare command");
    assert!(stdout.contains("report"), "Should show report command");
    assert!(stdout.contains("run-suite"), "Should show run-suite command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = k6ctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("k6ctl"), "Should show binary name");
}

/// Test deploy command help
#[test]
fn test_deploy_help() {
    let output = k6ctl(&["deploy", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Deploy help should succeed");
    assert!(stdout.contains("--type"), "Should show type option");
    assert!(stdout.contains("--rps"), "Should show rps option");
    assert!(stdout.contains("--wait"), "Should show wait option");
    assert!(stdout.contains("--save-results"), "Should show save option");
}

/// Test cleanup command help
#[test]
fn test_cleanup_help() {
    let output = k6ctl(&["cleanup", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Cleanup help should succeed");
    assert!(stdout.contains("--older-than"), "Should show older-than option");
    assert!(stdout.contains("--dry-run"), "Should show dry-run option");
    assert!(
        stdout.contains("--preserve-results"),
        "Should show preserve-results option"
    );
}

/// Test run-suite command help
#[test]
fn test_run_suite_help() {
    let output = k6ctl(&["run-suite", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Run-suite help should succeed");
    assert!(stdout.contains("--rps-levels"), "Should show rps-levels option");
    assert!(stdout.contains("--parallel"), "Should show parallel option");
}

/// Conflicting cleanup filters are an input error
#[test]
fn test_cleanup_conflicting_status_filters_exit_1() {
    let output = k6ctl(&["cleanup", "--completed", "--failed"]);
    assert_eq!(output.status.code(), Some(1));
}

/// Invalid test type fails before touching the cluster
#[test]
fn test_deploy_invalid_type_exit_1() {
    let output = k6ctl(&["deploy", "--type", "chaos", "--rps", "10"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("chaos"), "Should name the bad value");
}

/// Query commands with no stored results exit non-zero
#[test]
fn test_compare_without_results_exit_1() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().to_string_lossy().to_string();
    let output = k6ctl(&[
        "compare",
        "--type",
        "stress",
        "--rps",
        "100",
        "--results-dir",
        &results,
    ]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr.contains("No results found for stress-100rps"),
        "Should explain that nothing matched"
    );
}

/// Load tests are sized by their stages, not by --duration
#[test]
fn test_deploy_load_with_duration_exit_1() {
    let output = k6ctl(&["deploy", "--type", "load", "--rps", "50", "--duration", "2m"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("--duration"), "Should name the rejected flag");
}

/// Oversized durations are rejected, not a crash
#[test]
fn test_cleanup_oversized_age_exit_1() {
    let output = k6ctl(&["cleanup", "--older-than", "999999999999999999d", "--dry-run"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("too large"), "Should explain the rejection");
}
