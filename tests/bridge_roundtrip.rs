//! Integration test: run the web server on a free port, keep an agent call
//! suspended over an in-memory MCP stream, and answer it through HTTP.

use inputbridge::config::{AgentSettings, WebSettings};
use inputbridge::web::{bind, run_web_server};
use inputbridge::{AppState, McpServer, ProcessControl, RendezvousQueue, ShutdownReason};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

async fn start_web(queue: RendezvousQueue, control: ProcessControl) -> String {
    let settings = WebSettings {
        host: "127.0.0.1".to_string(),
        port: free_port(),
    };
    let listener = bind(&settings).await.expect("bind web server");
    tokio::spawn(run_web_server(listener, AppState::new(queue, control)));
    settings.url()
}

#[tokio::test]
async fn agent_call_is_answered_from_browser_submission() {
    let queue = RendezvousQueue::new();
    let control = ProcessControl::new(Duration::from_millis(10));
    let base = start_web(queue.clone(), control.clone()).await;

    let (mut agent_in, server_in) = tokio::io::duplex(64 * 1024);
    let (server_out, agent_out) = tokio::io::duplex(64 * 1024);
    let server = McpServer::with_input_tool(&AgentSettings::default(), queue.clone());
    tokio::spawn(async move { server.serve(server_in, server_out).await });
    let mut agent_lines = BufReader::new(agent_out).lines();

    let call = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": { "name": "get_vscode_input", "arguments": {} }
    });
    agent_in
        .write_all(format!("{}\n", call).as_bytes())
        .await
        .unwrap();

    for _ in 0..200 {
        if queue.stats().waiters == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(queue.stats().waiters, 1);

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/message", base))
        .json(&json!({ "content": "hello", "image": "data:image/png;base64,AAA=" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);

    let line = tokio::time::timeout(Duration::from_secs(2), agent_lines.next_line())
        .await
        .expect("agent response")
        .unwrap()
        .unwrap();
    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["id"], 1);
    assert_eq!(
        response["result"]["content"][0]["text"],
        "hello\n\n[IMAGE]\ndata:image/png;base64,AAA="
    );
}

#[tokio::test]
async fn messages_submitted_early_wait_in_order() {
    let queue = RendezvousQueue::new();
    let control = ProcessControl::new(Duration::from_millis(10));
    let base = start_web(queue.clone(), control).await;

    let client = reqwest::Client::new();
    for text in ["first", "second", ""] {
        let resp = client
            .post(format!("{}/message", base))
            .body(json!({ "content": text }).to_string())
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
    }

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["pending"], 3);

    assert_eq!(queue.fetch().await.unwrap().as_str(), "first");
    assert_eq!(queue.fetch().await.unwrap().as_str(), "second");
    assert_eq!(queue.fetch().await.unwrap().as_str(), "");
}

#[tokio::test]
async fn malformed_submission_is_rejected() {
    let queue = RendezvousQueue::new();
    let control = ProcessControl::new(Duration::from_millis(10));
    let base = start_web(queue.clone(), control).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/message", base))
        .body("definitely not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
    assert_eq!(queue.stats().pending, 0);
}

#[tokio::test]
async fn kill_is_acknowledged_before_shutdown() {
    let queue = RendezvousQueue::new();
    let control = ProcessControl::new(Duration::from_millis(50));
    let base = start_web(queue.clone(), control.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/kill", base))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);

    let reason = tokio::time::timeout(Duration::from_secs(2), control.wait())
        .await
        .expect("shutdown signalled");
    assert_eq!(reason, ShutdownReason::Kill);
}
