//! WebSocket task stream
//!
//! Binary frames carry raw process output. A text frame carries the final
//! status, and the server closes right after it. A close that was not
//! preceded by a status frame is reported as interrupted.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use hollow_core::ports::{close_outcome, StreamEvent, TaskStream};
use hollow_core::{CoreError, Result};
use hollow_types::{TaskFrame, TaskOutcome};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

pub struct WsTaskStream<S = MaybeTlsStream<TcpStream>> {
    ws: WebSocketStream<S>,
    status: Option<TaskOutcome>,
    done: bool,
}

fn handshake_error(e: WsError) -> CoreError {
    match e {
        WsError::Http(response) => match response.status().as_u16() {
            401 => CoreError::Unauthorized,
            404 => CoreError::NotFound("task".to_string()),
            status => CoreError::Http {
                status,
                message: "stream handshake refused".to_string(),
            },
        },
        other => CoreError::Transport(other.to_string()),
    }
}

/// Open the stream of one task
pub async fn connect(url: &str, token: Option<&str>) -> Result<WsTaskStream> {
    let mut request = url
        .into_client_request()
        .map_err(|e| CoreError::Transport(e.to_string()))?;
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| CoreError::Transport(e.to_string()))?;
        request.headers_mut().insert("Authorization", value);
    }
    let (ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(handshake_error)?;
    debug!("Attached to {}", url);
    Ok(WsTaskStream::new(ws))
}

impl<S> WsTaskStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self {
            ws,
            status: None,
            done: false,
        }
    }

    fn closed(&mut self, transport_error: Option<String>) -> StreamEvent {
        self.done = true;
        StreamEvent::Closed(close_outcome(self.status.take(), transport_error))
    }
}

#[async_trait]
impl<S> TaskStream for WsTaskStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.done {
            return None;
        }
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Binary(data))) => return Some(StreamEvent::Output(Bytes::from(data))),
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<TaskFrame>(&text) {
                    Ok(TaskFrame::Status { outcome }) => self.status = Some(outcome),
                    Err(e) => warn!("Ignoring unknown control frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => return Some(self.closed(None)),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(self.closed(Some(e.to_string()))),
            }
        }
    }

    async fn release(&mut self) {
        if !self.done {
            let _ = self.ws.close(None).await;
            self.done = true;
        }
    }
}
