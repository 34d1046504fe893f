//! CLI integration tests for codepad admin commands.
//!
//! Each test uses an isolated temp directory for the database, ensuring tests
//! can run in parallel safely.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use std::path::Path;

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use codepad::auth::parse_token;
use codepad::store::{SqliteStore, Store};
use predicates::prelude::*;

struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    fn data_dir_str(&self) -> String {
        self.data_dir().to_string_lossy().to_string()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("codepad").expect("failed to find binary");
        cmd.env("NO_COLOR", "1");
        cmd.env_remove("CODEPAD_DATA_DIR");
        cmd
    }

    fn init(&self) -> assert_cmd::assert::Assert {
        self.cmd()
            .args([
                "admin",
                "init",
                "--data-dir",
                &self.data_dir_str(),
                "--non-interactive",
            ])
            .assert()
    }

    fn store(&self) -> SqliteStore {
        SqliteStore::new(self.data_dir().join("codepad.db")).expect("open db")
    }
}

#[test]
fn test_init_creates_database_and_admin_token() {
    let ctx = TestContext::new();

    ctx.init()
        .success()
        .stdout(predicate::str::contains("Admin token"));

    ctx.temp_dir
        .child("codepad.db")
        .assert(predicate::path::exists());
    let token_file = ctx.temp_dir.child(".admin_token");
    token_file.assert(predicate::path::exists());

    let raw = std::fs::read_to_string(token_file.path()).expect("read token");
    assert!(raw.starts_with("codepad_"));
    assert!(parse_token(raw.trim()).is_ok());

    assert!(ctx.store().has_admin_token().expect("check admin token"));
}

#[cfg(unix)]
#[test]
fn test_init_restricts_token_file_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let ctx = TestContext::new();
    ctx.init().success();

    let mode = std::fs::metadata(ctx.data_dir().join(".admin_token"))
        .expect("token metadata")
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_init_twice_fails() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.init()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn test_init_non_interactive_creates_no_identity() {
    let ctx = TestContext::new();
    ctx.init().success();

    let identities = ctx.store().list_identities("", 10).expect("list identities");
    assert!(identities.is_empty());
}

#[test]
fn test_serve_requires_init() {
    let ctx = TestContext::new();

    ctx.cmd()
        .args(["serve", "--data-dir", &ctx.data_dir_str(), "--port", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Server not initialized"));
}

#[test]
fn test_help_lists_commands() {
    let ctx = TestContext::new();

    ctx.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("admin"));
}
