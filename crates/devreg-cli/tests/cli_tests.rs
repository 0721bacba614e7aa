//! End-to-end tests for the `devreg` binary.
//!
//! These spawn real OS processes to check that bind arbitration keeps a
//! single registry across processes.

use devreg_core::{RegistryClient, RegistrySettings};
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().unwrap().port()
}

fn devreg(port: u16) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_devreg"));
    command
        .env_remove("DEVREG_HOST")
        .env_remove("DEVREG_PORT")
        .arg("--port")
        .arg(port.to_string())
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    command
}

/// Spawn `devreg serve` and wait for its `DEVREG_PORT=` line.
async fn spawn_server(port: u16) -> Child {
    let mut child = devreg(port)
        .arg("serve")
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn devreg serve");

    let stdout = child.stdout.take().expect("piped stdout");
    let mut lines = BufReader::new(stdout).lines();
    let line = tokio::time::timeout(Duration::from_secs(10), lines.next_line())
        .await
        .expect("server announced its port in time")
        .expect("read stdout")
        .expect("stdout not closed");
    assert_eq!(line, format!("DEVREG_PORT={}", port));

    child
}

async fn run(port: u16, args: &[&str]) -> (bool, String) {
    let output = devreg(port)
        .args(args)
        .stdout(Stdio::piped())
        .output()
        .await
        .expect("run devreg");
    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    )
}

#[tokio::test]
async fn test_second_serve_defers_to_running_registry() {
    let port = free_port();
    let mut first = spawn_server(port).await;

    let (ok, stdout) = run(port, &["serve"]).await;
    assert!(ok, "second serve must not fail");
    assert_eq!(stdout.trim(), format!("DEVREG_ALREADY_RUNNING={}", port));

    // The first server is still the one answering.
    let client = RegistryClient::new(&RegistrySettings::default().with_port(port)).unwrap();
    assert_eq!(client.health().await.unwrap(), 0);

    first.kill().await.unwrap();
}

#[tokio::test]
async fn test_register_from_other_process_is_listed() {
    let port = free_port();
    let mut server = spawn_server(port).await;

    let (ok, _) = run(
        port,
        &[
            "register",
            "worker-a",
            "--worker-port",
            "8787",
            "--protocol",
            "http",
            "--durable-object",
            "DO1=Counter",
        ],
    )
    .await;
    assert!(ok);

    let (ok, stdout) = run(port, &["list", "--json"]).await;
    assert!(ok);
    let listed: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(listed["worker-a"]["port"], 8787);
    assert_eq!(listed["worker-a"]["durableObjects"][0]["className"], "Counter");

    let (ok, stdout) = run(port, &["bound", "--service", "worker-a", "--json"]).await;
    assert!(ok);
    let bound: Value = serde_json::from_str(&stdout).unwrap();
    assert!(bound.get("worker-a").is_some());

    let (ok, _) = run(port, &["unregister", "worker-a"]).await;
    assert!(ok);
    let (_, stdout) = run(port, &["list", "--json"]).await;
    assert_eq!(serde_json::from_str::<Value>(&stdout).unwrap(), serde_json::json!({}));

    server.kill().await.unwrap();
}

#[tokio::test]
async fn test_list_without_registry_is_not_an_error() {
    let port = free_port();
    let (ok, stdout) = run(port, &["list"]).await;
    assert!(ok);
    assert!(stdout.contains("No dev registry running"));
}
