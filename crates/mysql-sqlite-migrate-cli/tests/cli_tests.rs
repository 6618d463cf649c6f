//! CLI integration tests for mysql-sqlite-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for error conditions that need no MySQL server.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the mysql-sqlite-migrate binary.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("mysql-sqlite-migrate").unwrap();
    cmd.env_remove("MYSQL_PASSWORD");
    cmd
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_transfer_flags() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--sqlite-file"))
        .stdout(predicate::str::contains("--mysql-database"))
        .stdout(predicate::str::contains("--mysql-user"))
        .stdout(predicate::str::contains("--exclude-mysql-tables"))
        .stdout(predicate::str::contains("--without-foreign-keys"))
        .stdout(predicate::str::contains("--views-as-tables"))
        .stdout(predicate::str::contains("--chunk"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mysql-sqlite-migrate"));
}

#[test]
fn test_short_v_is_vacuum() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("-V, --vacuum"));
}

#[test]
fn test_logging_flag_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("--output-json"));
}

// =============================================================================
// Argument Errors
// =============================================================================

#[test]
fn test_include_and_exclude_conflict() {
    cmd()
        .args(["-f", "out.db", "-d", "shop", "-u", "root"])
        .args(["-t", "users", "-e", "logs"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_unknown_collation_rejected() {
    cmd()
        .args(["-f", "out.db", "-d", "shop", "-u", "root", "-C", "latin1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("BINARY, NOCASE, RTRIM"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 1)
// =============================================================================

#[test]
fn test_no_arguments_exits_with_code_1() {
    cmd()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_without_tables_and_data_exits_with_code_1() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("out.db");

    cmd()
        .args(["-f", db.to_str().unwrap(), "-d", "shop", "-u", "root"])
        .args(["--without-tables", "--without-data"])
        .assert()
        .code(1);

    assert!(!db.exists());
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap()])
        .assert()
        .code(1);
}

#[test]
fn test_config_missing_sqlite_file_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  database: shop").unwrap();
    writeln!(file, "  user: root").unwrap();
    writeln!(file, "target:").unwrap();
    writeln!(file, "  sqlite_file: \"\"").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap()])
        .assert()
        .code(1);
}

// =============================================================================
// Exit Code Tests - IO Errors (Exit Code 7)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml"])
        .assert()
        .code(7);
}

#[test]
fn test_unwritable_log_file_exits_with_code_7() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("missing").join("run.log");

    cmd()
        .args(["--log-file", log.to_str().unwrap()])
        .assert()
        .code(7);
}
