//! Integration tests for CLI commands

#![allow(deprecated)]

use assert_cmd::{assert::OutputAssertExt, cargo::CommandCargoExt};
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Write a config that never reaches the network for signed-out commands
fn write_config(dir: &Path) -> PathBuf {
    let config_path = dir.join("config.toml");
    let cache_path = dir.join("token_cache.json");
    std::fs::write(
        &config_path,
        format!(
            r#"
[auth]
tenant = "contoso.onmicrosoft.com"
client_id = "11111111-2222-3333-4444-555555555555"
browser_logout = false

[graph]
enabled = false

[cache]
backend = "file"
path = {:?}
"#,
            cache_path.to_string_lossy()
        ),
    )
    .unwrap();
    config_path
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("graph-signin").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("signin"))
        .stdout(predicate::str::contains("signout"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_status_without_cache_is_signed_out() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path());

    let mut cmd = Command::cargo_bin("graph-signin").unwrap();
    cmd.arg("--config").arg(&config).arg("status");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Not signed in"));
}

#[test]
fn test_signout_removes_cache_file() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path());
    let cache = tmp.path().join("token_cache.json");
    std::fs::write(
        &cache,
        r#"{
  "version": 1,
  "stored_at": 0,
  "entries": [
    {
      "access_token": "abc",
      "account_id": "u1",
      "expires_at": "2099-01-01T00:00:00Z",
      "resource_id": "https://graph.windows.net"
    }
  ]
}"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("graph-signin").unwrap();
    cmd.arg("--config").arg(&config).arg("status");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Signed in as"))
        .stdout(predicate::str::contains("u1"));

    let mut cmd = Command::cargo_bin("graph-signin").unwrap();
    cmd.arg("--config").arg(&config).arg("signout");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Signed out"));

    assert!(!cache.exists());
}

#[test]
fn test_signout_without_tenant_still_clears_cache() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("config.toml");
    let cache = tmp.path().join("token_cache.json");
    std::fs::write(
        &config,
        format!(
            "[auth]\nbrowser_logout = false\n\n[cache]\nbackend = \"file\"\npath = {:?}\n",
            cache.to_string_lossy()
        ),
    )
    .unwrap();
    std::fs::write(
        &cache,
        r#"{"version": 1, "stored_at": 0, "entries": [{"access_token": "abc", "account_id": "u1", "expires_at": "2099-01-01T00:00:00Z", "resource_id": "https://graph.windows.net"}]}"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("graph-signin").unwrap();
    cmd.arg("--config").arg(&config).arg("signout");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Signed out"));

    assert!(!cache.exists());
}

#[test]
fn test_unconfigured_tenant_fails() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("config.toml");
    std::fs::write(&config, "[cache]\nbackend = \"memory\"\n").unwrap();

    let mut cmd = Command::cargo_bin("graph-signin").unwrap();
    cmd.arg("--config").arg(&config).arg("status");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("auth.tenant is not configured"));
}

#[test]
fn test_config_init_and_show() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("nested").join("config.toml");

    let mut cmd = Command::cargo_bin("graph-signin").unwrap();
    cmd.arg("--config").arg(&config).arg("config").arg("init");
    cmd.assert().success();
    assert!(config.exists());

    // Refuses to clobber without --force
    let mut cmd = Command::cargo_bin("graph-signin").unwrap();
    cmd.arg("--config").arg(&config).arg("config").arg("init");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    let mut cmd = Command::cargo_bin("graph-signin").unwrap();
    cmd.arg("--config").arg(&config).arg("config").arg("show");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("login.microsoftonline.com"));
}
