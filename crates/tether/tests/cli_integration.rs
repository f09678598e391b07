//! CLI integration tests for the tether command-line interface.
//!
//! These tests verify:
//! - Help text and argument parsing
//! - Local-only commands (`status`, `config`) against temporary config files
//! - A full `connect` against a mock homeserver, followed by `status`
//!
//! Every invocation points `TETHER_CONFIG_DIR` at a temporary directory so
//! the real user config and log directory are never touched.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER: &str = "@bot:example.org";

/// Get a command for the tether binary, isolated from the user's config.
fn tether(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tether").unwrap();
    cmd.env("TETHER_CONFIG_DIR", home)
        .env_remove("TETHER_CONFIG")
        .env_remove("TETHER_PASSWORD")
        .env_remove("RUST_LOG")
        .current_dir(home);
    cmd
}

/// Write a config file pointing at `homeserver` and return its path.
fn write_config(dir: &Path, homeserver: &str, extra: &str) -> PathBuf {
    let path = dir.join("test.toml");
    let session = dir.join("session.json");
    std::fs::write(
        &path,
        format!(
            r#"
[homeserver]
url = "{homeserver}"
user_id = "{USER}"
{extra}

[session]
session_file_path = "{}"

[retry]
max_retries = 2
retry_backoff_seconds = [0]

[logging]
directory = "{}"
"#,
            session.display(),
            dir.join("logs").display(),
        ),
    )
    .unwrap();
    path
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Tether"));
}

#[test]
fn test_version_displays() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tether"));
}

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("connect"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("messages"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_messages_help_shows_flags() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .args(["messages", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--limit"))
        .stdout(predicate::str::contains("--follow"))
        .stdout(predicate::str::contains("--interval"));
}

#[test]
fn test_config_subcommands_listed() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("set-password"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Handling Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_subcommand_fails() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .arg("nonexistent-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_messages_requires_room() {
    let home = TempDir::new().unwrap();
    tether(home.path()).arg("messages").assert().failure();
}

#[test]
fn test_missing_explicit_config_fails() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .args(["--config", "does-not-exist.toml", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn test_status_requires_session_path() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("session_file_path"));
}

#[test]
fn test_connect_without_password_fails() {
    let home = TempDir::new().unwrap();
    let config = write_config(home.path(), "http://127.0.0.1:9", "");
    tether(home.path())
        .arg("--config")
        .arg(&config)
        .arg("connect")
        .assert()
        .failure()
        .stderr(predicate::str::contains("password not found"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Local Command Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_status_without_session() {
    let home = TempDir::new().unwrap();
    let config = write_config(home.path(), "http://127.0.0.1:9", "");
    let output = tether(home.path())
        .arg("--config")
        .arg(&config)
        .args(["--json", "status"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["exists"], false);
    assert_eq!(report["restorable"], false);
}

#[test]
fn test_config_show_redacts_password() {
    let home = TempDir::new().unwrap();
    let config = write_config(home.path(), "http://127.0.0.1:9", r#"password = "hunter2""#);
    tether(home.path())
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2").not())
        .stdout(predicate::str::contains("[redacted]"))
        .stdout(predicate::str::contains("config file (plaintext)"));
}

#[test]
fn test_config_init_local_creates_template() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .args(["config", "init", "--local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config file"));

    let written = std::fs::read_to_string(home.path().join("tether.toml")).unwrap();
    assert!(written.contains("[circuit_breaker]"));

    // A second init leaves the file alone.
    tether(home.path())
        .args(["config", "init", "--local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_config_which_lists_sources() {
    let home = TempDir::new().unwrap();
    tether(home.path())
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"))
        .stdout(predicate::str::contains("tether.toml"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Homeserver Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_connect_saves_session_then_restores() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_matrix/client/v3/login"))
        .and(body_partial_json(json!({ "password": "hunter2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": USER,
            "device_id": "DEVCLI",
            "access_token": "syt_cli_token_5678"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_matrix/client/v3/account/whoami"))
        .and(header("authorization", "Bearer syt_cli_token_5678"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": USER,
            "device_id": "DEVCLI"
        })))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let config = write_config(home.path(), &server.uri(), "");
    let home_path = home.path().to_path_buf();

    let (first, second, status) = tokio::task::spawn_blocking(move || {
        let connect = |home: &Path, config: &Path| -> Value {
            let out = tether(home)
                .env("TETHER_PASSWORD", "hunter2")
                .arg("--config")
                .arg(config)
                .args(["--json", "connect"])
                .assert()
                .success()
                .get_output()
                .stdout
                .clone();
            serde_json::from_slice(&out).unwrap()
        };
        let first = connect(&home_path, &config);
        let second = connect(&home_path, &config);
        let status = tether(&home_path)
            .arg("--config")
            .arg(&config)
            .args(["--json", "status"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        (first, second, serde_json::from_slice::<Value>(&status).unwrap())
    })
    .await
    .unwrap();

    assert_eq!(first["login_source"], "fresh login");
    assert_eq!(first["device_id"], "DEVCLI");
    assert_eq!(first["access_token"], "****5678");

    // The second run reuses the saved session; the login mock expects one call.
    assert_eq!(second["login_source"], "restored");

    assert_eq!(status["restorable"], true);
    assert_eq!(status["user_id"], USER);
    #[cfg(unix)]
    assert_eq!(status["permissions"], "600");
}
