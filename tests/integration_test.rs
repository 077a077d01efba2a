// tests/integration_test.rs
use std::process::Command;

#[test]
fn test_release_train_help() {
    let output = Command::new("cargo")
        .args(["run", "--bin", "release-train", "--", "--help"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("release-train"));
    for subcommand in [
        "stage",
        "release",
        "hotfix-start",
        "hotfix-finish",
        "close-branches",
        "translations",
        "cross-request",
        "show-version",
    ] {
        assert!(stdout.contains(subcommand), "missing {}", subcommand);
    }
}

#[test]
fn test_release_requires_a_version() {
    let output = Command::new("cargo")
        .args(["run", "--bin", "release-train", "--", "release"])
        .output()
        .expect("Failed to execute command");

    // clap usage error
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_invalid_version_is_rejected() {
    let output = Command::new("cargo")
        .args(["run", "--bin", "release-train", "--", "release", "two.four"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("two.four"));
}
