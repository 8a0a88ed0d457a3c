//! WebSocket task stream
//!
//! A client attaches to a task by key. It first receives the backlog, then
//! live output, all as binary frames. When the task ends one text frame
//! carries the outcome and the server closes the socket. Client frames other
//! than Close are ignored. A stream that falls behind catches up from the
//! backlog; bytes already gone from it are reported in a marker line.

use crate::error::{ApiError, ApiResult};
use crate::extractors::Authenticated;
use crate::services::task_hub::{Attachment, HubEvent, TaskHub};
use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use hollow_types::{TaskFrame, TaskOutcome};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

pub async fn handler(
    _auth: Authenticated,
    ws: WebSocketUpgrade,
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Response> {
    let attachment = state
        .hub
        .attach(&key)
        .ok_or_else(|| ApiError::NotFound(format!("unknown task {}", key)))?;
    info!("Stream attached to task {}", key);
    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, key, attachment)))
}

fn status_frame(outcome: TaskOutcome) -> Option<Message> {
    match serde_json::to_string(&TaskFrame::Status { outcome }) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            warn!("Failed to encode status frame: {}", e);
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, hub: Arc<TaskHub>, key: String, attachment: Attachment) {
    let (mut sender, mut receiver) = socket.split();
    let Attachment {
        backlog,
        finished,
        mut events,
        superseded,
        mut cursor,
    } = attachment;

    if !backlog.is_empty() && sender.send(Message::Binary(backlog.to_vec())).await.is_err() {
        debug!("Stream for {} went away during backlog", key);
        return;
    }

    let outcome = match finished {
        Some(outcome) => Some(outcome),
        None => loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(HubEvent::Output { offset, data }) => {
                        let Some(fresh) = cursor.accept(offset, &data) else {
                            continue;
                        };
                        if sender.send(Message::Binary(fresh.to_vec())).await.is_err() {
                            break None;
                        }
                    }
                    Ok(HubEvent::Finished(outcome)) => break Some(outcome),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Stream for {} lagged by {} chunks, catching up", key, skipped);
                        let Some(catch_up) = cursor.catch_up(&hub, &key) else {
                            break None;
                        };
                        let mut frame = Vec::new();
                        if catch_up.missed > 0 {
                            frame.extend_from_slice(
                                format!("\n[Hollow] {} bytes of output skipped\n", catch_up.missed).as_bytes(),
                            );
                        }
                        frame.extend_from_slice(&catch_up.data);
                        if !frame.is_empty() && sender.send(Message::Binary(frame)).await.is_err() {
                            break None;
                        }
                    }
                    Err(RecvError::Closed) => break None,
                },
                _ = superseded.cancelled() => {
                    debug!("Stream for {} superseded", key);
                    break None;
                }
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        debug!("Client left stream for {}", key);
                        return;
                    }
                    Some(Ok(_)) => {}
                },
            }
        },
    };

    if let Some(frame) = outcome.and_then(status_frame) {
        let _ = sender.send(frame).await;
    }
    let _ = sender.send(Message::Close(None)).await;
    info!("Stream for task {} closed", key);
}
