mod common;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use std::process::{Command, Output};

use common::TestEnvironment;

/// Integration tests for repomirror CLI commands
/// These tests run the actual binary and verify its behavior

fn repomirror(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_repomirror"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_cli_help() {
    let output = repomirror(&["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    // Verify help contains expected commands
    for command in ["clone", "pull", "status", "config", "doctor"] {
        assert!(stdout.contains(command), "missing {} in help", command);
    }
}

#[test]
fn test_cli_version() {
    let output = repomirror(&["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("repomirror"));
}

#[test]
fn test_help_subcommands() {
    for command in ["clone", "pull"] {
        let output = repomirror(&[command, "--help"]);
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("--source"));
        assert!(stdout.contains("--repo"));
        assert!(stdout.contains("--json"));
    }
}

#[test]
fn test_invalid_command() {
    let output = repomirror(&["sync"]);
    assert!(!output.status.success());
}

#[test]
fn test_config_init_writes_example_once() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.child("nested/config.yml");
    let path = config.path().to_str().unwrap();

    let output = repomirror(&["--config", path, "config", "init"]);
    assert!(output.status.success());
    config.assert(predicate::path::exists());
    config.assert(predicate::str::contains("providers:").and(predicate::str::contains("run_queue")));

    // Existing config is kept unless forced
    let output = repomirror(&["--config", path, "config", "init"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--force"));

    let output = repomirror(&["--config", path, "config", "init", "--force"]);
    assert!(output.status.success());
}

#[test]
fn test_config_path_and_print() {
    let env = TestEnvironment::new();
    let config_path = env.create_minimal_config();
    let path = config_path.to_str().unwrap();

    let output = repomirror(&["--config", path, "config", "path"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), path);

    let output = repomirror(&["--config", path, "config", "print"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("git.example.com"));
    assert!(stdout.contains("- foo"));
}

fn config_edit(config: &str, editor: &str) -> Output {
    Command::new(env!("CARGO_BIN_EXE_repomirror"))
        .args(["--config", config, "config", "edit"])
        .env_remove("VISUAL")
        .env("EDITOR", editor)
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_config_edit_runs_editor_on_config_file() {
    let env = TestEnvironment::new();
    let config_path = env.create_minimal_config();
    let path = config_path.to_str().unwrap();

    // The editor receives the config path as its last argument
    let output = config_edit(path, "test -f");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let output = config_edit(path, "false");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Editor false exited"));

    let missing = env.storage_dir().join("missing.yml");
    let output = config_edit(missing.to_str().unwrap(), "true");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("config init"));
}

#[test]
fn test_error_handling_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.child("invalid-config.yml");
    config_path.write_str("invalid: yaml: content: [").unwrap();

    let output = repomirror(&["--config", config_path.path().to_str().unwrap(), "status"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("parse") || stderr.contains("config"));
}

#[test]
fn test_status_reports_local_state() {
    let env = TestEnvironment::new();
    let config_path = env.create_minimal_config();

    let output = repomirror(&["--config", config_path.to_str().unwrap(), "status"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("foo: not cloned"));

    let foo = env.storage_dir().join("foo");
    std::fs::create_dir_all(&foo).unwrap();
    std::fs::write(foo.join("notes.txt"), "keep me").unwrap();

    let output = repomirror(&["--config", config_path.to_str().unwrap(), "status"]);
    assert!(String::from_utf8_lossy(&output.stdout).contains("foo: not a repository"));
}

#[test]
fn test_clone_skips_cluttered_directory_as_json() {
    let env = TestEnvironment::new();
    let config_path = env.create_minimal_config();
    let foo = env.storage_dir().join("foo");
    std::fs::create_dir_all(&foo).unwrap();
    std::fs::write(foo.join("notes.txt"), "keep me").unwrap();

    let output = repomirror(&["--config", config_path.to_str().unwrap(), "clone", "--json"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(summary["mode"], "clone");
    assert_eq!(summary["skipped"], 1);
    assert_eq!(summary["reports"][0]["name"], "foo");
    assert_eq!(summary["reports"][0]["outcome"]["status"], "skipped");
    assert!(foo.join("notes.txt").exists());
}

#[test]
fn test_clone_rejects_unknown_repository() {
    let env = TestEnvironment::new();
    let config_path = env.create_minimal_config();

    let output = repomirror(&[
        "--config",
        config_path.to_str().unwrap(),
        "clone",
        "--repo",
        "nope",
    ]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope"));
}

#[test]
fn test_missing_private_key_aborts_run() {
    let env = TestEnvironment::new();
    let config_path = env.create_test_config(&format!(
        r#"
storage:
  path: "{}"
ssh:
  private_key: "/nonexistent/id_ed25519"
providers:
  origin: {{ url: "github.com", username: "acme" }}
  mirror: {{ url: "git.example.com", username: "acme" }}
repositories: [foo]
"#,
        env.storage_dir().display()
    ));

    let output = repomirror(&["--config", config_path.to_str().unwrap(), "pull"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to acquire SSH credentials"));
    assert!(!env.storage_dir().exists());
}

#[test]
fn test_doctor_command() {
    let env = TestEnvironment::new();
    let config_path = env.create_minimal_config();

    let output = repomirror(&["--config", config_path.to_str().unwrap(), "doctor"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("System Diagnostics"));
    assert!(stdout.contains("Git"));
    assert!(stdout.contains("Private Key"));
}
