//! Integration tests driving the `filedex` binary end to end.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Run the binary against a store and config inside `dir`.
fn filedex(dir: &Path, args: &[&str]) -> Output {
    filedex_with_host(dir, dir, args)
}

fn filedex_with_host(dir: &Path, host: &Path, args: &[&str]) -> Output {
    let config = dir.join("config.toml");
    if !config.exists() {
        std::fs::write(&config, "timeout_ms = 2000\n").unwrap();
    }
    Command::new(env!("CARGO_BIN_EXE_filedex"))
        .arg("--config")
        .arg(&config)
        .arg("--host")
        .arg(host)
        .args(args)
        .output()
        .expect("failed to run filedex")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim_end().to_string()
}

#[test]
fn test_crud_scenario_exit_codes() {
    let dir = TempDir::new().unwrap();

    let add = filedex(dir.path(), &["add", "--id=1", "--name=Alice"]);
    assert_eq!(add.status.code(), Some(0));

    let list = filedex(dir.path(), &["list"]);
    assert_eq!(stdout(&list), r#"[{"id":1,"name":"Alice"}]"#);

    let update = filedex(dir.path(), &["update", "--id=1", "--name=Bob"]);
    assert_eq!(update.status.code(), Some(0));

    let get = filedex(dir.path(), &["get", "--id=1"]);
    assert_eq!(stdout(&get), r#"{"id":1,"name":"Bob"}"#);

    let remove = filedex(dir.path(), &["remove", "--id=1"]);
    assert_eq!(remove.status.code(), Some(0));

    let gone = filedex(dir.path(), &["get", "--id=1"]);
    assert_eq!(gone.status.code(), Some(2));
    assert!(gone.stdout.is_empty());
    assert!(String::from_utf8_lossy(&gone.stderr).contains("not found"));
}

#[test]
fn test_usage_and_validation_errors_exit_one() {
    let dir = TempDir::new().unwrap();

    assert_eq!(filedex(dir.path(), &["frobnicate"]).status.code(), Some(1));
    assert_eq!(filedex(dir.path(), &["get"]).status.code(), Some(1));
    assert_eq!(filedex(dir.path(), &["get", "--id=abc"]).status.code(), Some(1));
    assert_eq!(filedex(dir.path(), &["--help"]).status.code(), Some(0));
}

#[test]
fn test_validation_is_reported_before_backend_errors() {
    let dir = TempDir::new().unwrap();

    let output = filedex(dir.path(), &["--backend=oracle", "get", "--id=abc"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("id"));

    let output = filedex(dir.path(), &["--backend=oracle", "get", "--id=1"]);
    assert_eq!(output.status.code(), Some(3));

    let output = filedex(dir.path(), &["--database=a/b", "add", "--name=x"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_duplicate_add_exits_four() {
    let dir = TempDir::new().unwrap();
    filedex(dir.path(), &["add", "--id=7", "--name=first"]);

    let again = filedex(dir.path(), &["add", "--id=7", "--name=second"]);
    assert_eq!(again.status.code(), Some(4));

    let get = filedex(dir.path(), &["get", "--id=7"]);
    assert_eq!(stdout(&get), r#"{"id":7,"name":"first"}"#);
}

#[test]
fn test_missing_host_exits_three() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nowhere");
    let output = filedex_with_host(dir.path(), &missing, &["list"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_json_flag_and_status() {
    let dir = TempDir::new().unwrap();
    let add = filedex(dir.path(), &["--json", "add", "--id=2", "--name=b", "--size=5"]);
    assert_eq!(stdout(&add), r#"{"id":2,"name":"b","size":5}"#);

    let status = filedex(dir.path(), &["status", "--json"]);
    let value: serde_json::Value = serde_json::from_str(&stdout(&status)).unwrap();
    assert_eq!(value["backend"], "production");
    assert_eq!(value["records"], 1);
}

#[test]
fn test_scan_reports_identical_files_as_duplicates() {
    let dir = TempDir::new().unwrap();
    let files = dir.path().join("files");
    std::fs::create_dir(&files).unwrap();
    std::fs::write(files.join("one.bin"), "same bytes").unwrap();
    std::fs::write(files.join("two.bin"), "same bytes").unwrap();

    let scan = filedex(dir.path(), &["scan", "--dir", files.to_str().unwrap()]);
    assert_eq!(scan.status.code(), Some(0));
    assert_eq!(stdout(&scan), "Scanned 2 file(s): 2 added, 0 updated, 0 unchanged");

    let duplicates = filedex(dir.path(), &["duplicates"]);
    let groups: serde_json::Value = serde_json::from_str(&stdout(&duplicates)).unwrap();
    assert_eq!(groups.as_array().map(Vec::len), Some(1));
    assert_eq!(groups[0]["records"].as_array().map(Vec::len), Some(2));

    let missing = filedex(dir.path(), &["scan", "--dir", "/definitely/not/here"]);
    assert_eq!(missing.status.code(), Some(1));
}

#[test]
fn test_config_set_and_show() {
    let dir = TempDir::new().unwrap();
    let set = filedex(dir.path(), &["config", "set", "password", "hunter2"]);
    assert_eq!(set.status.code(), Some(0));

    let show = filedex(dir.path(), &["config", "show"]);
    let shown = stdout(&show);
    assert!(shown.contains("timeout_ms = 2000"));
    assert!(!shown.contains("hunter2"));

    let bad = filedex(dir.path(), &["config", "set", "colour", "red"]);
    assert_eq!(bad.status.code(), Some(1));
}

#[test]
fn test_quoted_environment_values_load() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "timeout_ms = 2000\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_filedex"))
        .arg("--config")
        .arg(&config)
        .arg("--host")
        .arg(dir.path())
        .arg("status")
        .env("FILEDEX_PASSWORD", "it's \"secret\"")
        .env("FILEDEX_USER", "o'brien")
        .output()
        .expect("failed to run filedex");
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
}
