#![allow(clippy::unwrap_used, clippy::expect_used, clippy::use_debug)]

//! CLI smoke tests for the graph-daemon binary
//!
//! Runs the built binary against temporary settings files and, for the
//! end-to-end cases, mock token and Graph endpoints.

use std::path::Path;
use std::process::{Command, Stdio};

use httpmock::prelude::*;
use tempfile::TempDir;

/// Run graph-daemon in `dir` (so no stray `appsettings.json` is picked up)
fn run_graph_daemon(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_graph-daemon"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("Failed to execute graph-daemon")
}

fn write_settings(dir: &TempDir, contents: &str) -> String {
    let path = dir.path().join("appsettings.json");
    std::fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

fn mock_settings(dir: &TempDir, server: &MockServer) -> String {
    let base = format!("http://localhost:{}", server.port());
    write_settings(
        dir,
        &format!(
            r#"{{
                "applicationId": "daemon-app",
                "applicationSecret": "daemon-secret",
                "tenantId": "contoso",
                "domain": "contoso.onmicrosoft.com",
                "authorityHost": "{base}",
                "graphBaseUrl": "{base}/v1.0",
                "allowInsecureHttp": true
            }}"#
        ),
    )
}

fn mock_token(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path("/contoso/oauth2/v2.0/token")
            .form_urlencoded_tuple("grant_type", "client_credentials")
            .form_urlencoded_tuple("client_id", "daemon-app")
            .form_urlencoded_tuple("scope", "https://graph.microsoft.com/.default");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"access_token":"daemon-tok","expires_in":3599,"token_type":"Bearer"}"#);
    })
}

#[test]
fn test_cli_help_command() {
    let dir = TempDir::new().unwrap();
    let output = run_graph_daemon(dir.path(), &["--help"]);

    assert!(output.status.success(), "Help command should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"), "Should contain usage information");
    assert!(stdout.contains("users"), "Should contain 'users' subcommand");
    assert!(stdout.contains("raw"), "Should contain 'raw' subcommand");
    assert!(stdout.contains("check"), "Should contain 'check' subcommand");
    assert!(stdout.contains("--config"), "Should contain config option");
}

#[test]
fn test_cli_version_command() {
    let dir = TempDir::new().unwrap();
    let output = run_graph_daemon(dir.path(), &["--version"]);

    assert!(output.status.success(), "Version command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("graph-daemon"));
}

#[test]
fn test_check_with_nonexistent_config() {
    let dir = TempDir::new().unwrap();
    let output = run_graph_daemon(dir.path(), &["--config", "/nonexistent/appsettings.json", "check"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not exist"), "stderr: {stderr}");
}

#[test]
fn test_check_reports_missing_settings() {
    let dir = TempDir::new().unwrap();
    let path = write_settings(&dir, r#"{"applicationId": "app"}"#);
    let output = run_graph_daemon(dir.path(), &["--config", &path, "check"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Missing or invalid"), "stderr: {stderr}");
    assert!(stderr.contains("applicationSecret"), "stderr: {stderr}");
}

#[test]
fn test_check_valid_config_makes_no_requests() {
    let server = MockServer::start();
    let token = mock_token(&server);
    let dir = TempDir::new().unwrap();
    let path = mock_settings(&dir, &server);

    let output = run_graph_daemon(dir.path(), &["--config", &path, "check"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Configuration OK"));
    token.assert_calls(0);
}

#[test]
fn test_check_fetch_token() {
    let server = MockServer::start();
    let token = mock_token(&server);
    let dir = TempDir::new().unwrap();
    let path = mock_settings(&dir, &server);

    let output = run_graph_daemon(dir.path(), &["--config", &path, "check", "--fetch-token"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Token acquired"));
    assert!(!stdout.contains("daemon-tok"), "token must not be printed");
    token.assert_calls(1);
}

#[test]
fn test_default_run_prints_users_and_raw_result() {
    let server = MockServer::start();
    let token = mock_token(&server);
    let typed = server.mock(|when, then| {
        when.method(GET)
            .path("/v1.0/users")
            .query_param("$top", "5")
            .query_param("$orderby", "displayName desc")
            .header("authorization", "Bearer daemon-tok");
        then.status(200).body(
            r#"{"value":[{"id":"2","displayName":"Zoe"},{"id":"1","displayName":"Adele"}]}"#,
        );
    });
    let raw = server.mock(|when, then| {
        when.method(GET)
            .path("/v1.0/users")
            .query_param("$top", "5")
            .query_param("$select", "displayName")
            .header("authorization", "Bearer daemon-tok");
        then.status(200).body(r#"{"value":[{"displayName":"raw-marker"}]}"#);
    });

    let dir = TempDir::new().unwrap();
    let path = mock_settings(&dir, &server);
    let output = run_graph_daemon(dir.path(), &["--config", &path]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("** Tenant users **"));
    assert!(stdout.contains("---Graph Service Client Result---"));
    assert!(stdout.find("Zoe").unwrap() < stdout.find("Adele").unwrap());
    assert!(stdout.contains("---HTTP Result---"));
    assert!(stdout.contains("raw-marker"));

    // One token serves both calls
    token.assert_calls(1);
    typed.assert_calls(1);
    raw.assert_calls(1);
}

#[test]
fn test_token_failure_skips_graph_call() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/contoso/oauth2/v2.0/token");
        then.status(401)
            .body(r#"{"error":"invalid_client","error_description":"AADSTS7000215"}"#);
    });
    let graph = server.mock(|when, then| {
        when.method(GET).path("/v1.0/users");
        then.status(200).body(r#"{"value":[]}"#);
    });

    let dir = TempDir::new().unwrap();
    let path = mock_settings(&dir, &server);
    let output = run_graph_daemon(dir.path(), &["--config", &path, "users"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("authentication failed"), "stderr: {stderr}");
    assert!(!stderr.contains("daemon-secret"));
    graph.assert_calls(0);
}

#[test]
fn test_users_select_is_forwarded() {
    let server = MockServer::start();
    let token = mock_token(&server);
    let users = server.mock(|when, then| {
        when.method(GET)
            .path("/v1.0/users")
            .query_param("$top", "2")
            .query_param("$select", "displayName,id")
            .header("authorization", "Bearer daemon-tok");
        then.status(200)
            .body(r#"{"value":[{"id":"7","displayName":"Megan"}]}"#);
    });

    let dir = TempDir::new().unwrap();
    let path = mock_settings(&dir, &server);
    let output = run_graph_daemon(
        dir.path(),
        &["--config", &path, "users", "--top", "2", "--select", "displayName,id"],
    );

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Megan"));
    token.assert_calls(1);
    users.assert_calls(1);
}
