//! Integration tests for the `verge` binary.
//!
//! These run the compiled binary with a scrubbed `VERGE_*` environment and,
//! where a server is needed, point it at a wiremock server.

use std::process::Output;

use assert_cmd::Command;
use assert_cmd::assert::OutputAssertExt;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VERGE_VARS: [&str; 8] = [
    "VERGE_HOST",
    "VERGE_USERNAME",
    "VERGE_PASSWORD",
    "VERGE_TOKEN",
    "VERGE_VERIFY_SSL",
    "VERGE_TIMEOUT",
    "VERGE_RETRY_TOTAL",
    "VERGE_RETRY_BACKOFF",
];

fn verge() -> Command {
    let mut cmd = Command::cargo_bin("verge").unwrap();
    for var in VERGE_VARS {
        cmd.env_remove(var);
    }
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Run the binary off the async runtime so the mock server keeps serving.
async fn run(args: Vec<String>) -> Output {
    tokio::task::spawn_blocking(move || verge().args(args).output().unwrap())
        .await
        .unwrap()
}

async fn mock_system(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v4/system"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "$key": 1,
            "yb_version": "26.0.2",
            "os_version": "26.0",
            "cloud_name": "lab"
        }])))
        .mount(server)
        .await;
}

fn server_args(server: &MockServer, rest: &[&str]) -> Vec<String> {
    let mut args = vec![
        "--host".to_owned(),
        server.uri(),
        "--token".to_owned(),
        "test-token".to_owned(),
    ];
    args.extend(rest.iter().map(|s| (*s).to_owned()));
    args
}

// ==================== Argument and Environment Validation ====================

#[test]
fn test_help_lists_commands() {
    verge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("vms"))
        .stdout(predicate::str::contains("tenants"))
        .stdout(predicate::str::contains("resource-groups"));
}

#[test]
fn test_missing_host_error() {
    verge()
        .arg("system")
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("error:"))
        .stderr(predicate::str::contains("VERGE_HOST"));
}

#[test]
fn test_malformed_timeout_error() {
    verge()
        .env("VERGE_HOST", "verge.invalid")
        .env("VERGE_TIMEOUT", "soon")
        .arg("system")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("VERGE_TIMEOUT"));
}

#[test]
fn test_task_wait_requires_key() {
    verge()
        .args(["tasks", "wait"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("<KEY>"));
}

#[test]
fn test_file_download_rejects_non_numeric_key() {
    verge()
        .args(["files", "download", "ubuntu.iso", "/tmp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

// ==================== Against a Mock Server ====================

#[tokio::test(flavor = "multi_thread")]
async fn test_system_prints_version() {
    let server = MockServer::start().await;
    mock_system(&server).await;

    let output = run(server_args(&server, &["system"])).await;
    output
        .assert()
        .success()
        .stdout(predicate::str::contains("connected=true"))
        .stdout(predicate::str::contains("version=26.0.2"))
        .stdout(predicate::str::contains("cloud_name=lab"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_vms_list_excludes_snapshots() {
    let server = MockServer::start().await;
    mock_system(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v4/vms"))
        .and(query_param("filter", "is_snapshot eq false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"$key": 5, "name": "web01", "status": "running", "running": true, "cpu_cores": 2, "ram": 2048},
            {"$key": 6, "name": "db01", "status": "stopped", "running": false, "cpu_cores": 4, "ram": 8192}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let output = run(server_args(&server, &["vms", "list"])).await;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    output.assert().success();

    assert!(stdout.contains("key=5 name=web01 status=running"));
    assert!(stdout.contains("key=6 name=db01 status=stopped"));
    assert!(stdout.contains("count=2"));
    for line in stdout.lines() {
        assert!(line.contains('='), "expected key=value output, got: {line}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_credentials_exit_with_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/system"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"err": "bad token"})))
        .mount(&server)
        .await;

    let output = run(server_args(&server, &["vms", "list"])).await;
    output
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error: authentication failed"))
        .stderr(predicate::str::contains("bad token"));
}
