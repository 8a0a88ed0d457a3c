//! End to end: log in over HTTP, start a task, follow it over WebSocket

use async_trait::async_trait;
use futures::StreamExt;
use hollow_server::config::{Overrides, ServerConfig};
use hollow_server::services::orchestrator::{Job, TaskBackend, TaskError};
use hollow_server::services::TaskOutput;
use hollow_server::{build_router, AppState};
use hollow_types::{TaskFrame, TaskOutcome};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

struct EchoBackend {
    gate: CancellationToken,
}

#[async_trait]
impl TaskBackend for EchoBackend {
    async fn run(&self, job: &Job, out: &TaskOutput) -> Result<(), TaskError> {
        out.line(format!("hello from {}", job.kind));
        self.gate.cancelled().await;
        out.line("bye");
        Ok(())
    }
}

async fn spawn_server(dir: &tempfile::TempDir, gate: CancellationToken) -> SocketAddr {
    let path = dir.path().join("hollow.toml");
    std::fs::write(&path, "secret = \"pw\"\n").unwrap();
    let config = ServerConfig::load(
        Some(&path),
        Overrides {
            source_dir: Some(dir.path().join("src")),
            ..Default::default()
        },
    )
    .unwrap();
    let state = AppState::new(config, Arc::new(EchoBackend { gate }))
        .await
        .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    addr
}

async fn login(client: &reqwest::Client, addr: SocketAddr) -> String {
    let response = client
        .post(format!("http://{}/api/auth", addr))
        .json(&serde_json::json!({ "secret": "pw" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let cookie = response
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("token="))
        .unwrap()
        .to_string()
}

async fn start_publish(client: &reqwest::Client, addr: SocketAddr, token: &str) -> String {
    client
        .post(format!("http://{}/api/publish", addr))
        .bearer_auth(token)
        .json(&serde_json::json!({ "project_id": 1 }))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn connect(
    addr: SocketAddr,
    key: &str,
    token: &str,
) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>> {
    let mut request = format!("ws://{}/ws/{}", addr, key)
        .into_client_request()
        .unwrap();
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", token).parse().unwrap(),
    );
    let (ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    ws
}

/// Collect output until the status frame and the close that follows it
async fn follow<S>(ws: &mut S) -> (String, Option<TaskOutcome>)
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut output = Vec::new();
    let mut outcome = None;
    while let Some(message) = ws.next().await {
        match message.unwrap() {
            Message::Binary(data) => output.extend_from_slice(&data),
            Message::Text(text) => {
                let TaskFrame::Status { outcome: o } = serde_json::from_str(&text).unwrap();
                outcome = Some(o);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    (String::from_utf8(output).unwrap(), outcome)
}

#[tokio::test]
async fn test_task_output_streams_to_client() {
    let dir = tempfile::tempdir().unwrap();
    let gate = CancellationToken::new();
    let addr = spawn_server(&dir, gate.clone()).await;
    let client = reqwest::Client::new();
    let token = login(&client, addr).await;

    let key = start_publish(&client, addr, &token).await;
    assert_eq!(key.len(), 8);

    // A second task for the same project is refused while the first runs
    let busy = client
        .post(format!("http://{}/api/publish", addr))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "project_id": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(busy.status(), reqwest::StatusCode::CONFLICT);

    let mut ws = connect(addr, &key, &token).await;
    gate.cancel();
    let (output, outcome) = follow(&mut ws).await;
    assert!(output.contains("[Hollow] start publish\n"));
    assert!(output.contains("hello from publish\n"));
    assert!(output.contains("bye\n"));
    assert!(output.contains("[Hollow] publish success in"));
    assert_eq!(outcome, Some(TaskOutcome::Succeeded));

    // Attaching after the end replays the backlog and the outcome
    let mut again = connect(addr, &key, &token).await;
    let (replay, outcome) = follow(&mut again).await;
    assert_eq!(replay, output);
    assert_eq!(outcome, Some(TaskOutcome::Succeeded));
}

#[tokio::test]
async fn test_cancel_reaches_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(&dir, CancellationToken::new()).await;
    let client = reqwest::Client::new();
    let token = login(&client, addr).await;

    let key = start_publish(&client, addr, &token).await;
    let mut ws = connect(addr, &key, &token).await;

    let cancelled = client
        .delete(format!("http://{}/api/task/{}", addr, key))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert!(cancelled.status().is_success());

    let (output, outcome) = follow(&mut ws).await;
    assert!(output.contains("[Hollow] publish cancelled"));
    assert_eq!(outcome, Some(TaskOutcome::Cancelled));

    let info: serde_json::Value = client
        .get(format!("http://{}/api/task/{}", addr, key))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["state"], "finished");
    assert_eq!(info["outcome"]["status"], "cancelled");
}

#[tokio::test]
async fn test_stream_requires_login_and_known_key() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn_server(&dir, CancellationToken::new()).await;
    let client = reqwest::Client::new();
    let token = login(&client, addr).await;

    let anonymous = tokio_tungstenite::connect_async(format!("ws://{}/ws/abc", addr)).await;
    assert!(anonymous.is_err());

    let mut request = format!("ws://{}/ws/unknown", addr)
        .into_client_request()
        .unwrap();
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", token).parse().unwrap(),
    );
    assert!(tokio_tungstenite::connect_async(request).await.is_err());
}
