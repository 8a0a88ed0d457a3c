//! Task start request channel and streaming transport

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use hollow_types::{Repo, Task, TaskKind, TaskOutcome};

/// Something observed on a task stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Raw process output, stdout and stderr interleaved
    Output(Bytes),
    /// The stream is closed; no further events follow
    Closed(TaskOutcome),
}

/// A persistent, read-only connection attached to one task key
#[async_trait]
pub trait TaskStream: Send {
    /// Next event. Returns `None` once `Closed` has been delivered.
    async fn next_event(&mut self) -> Option<StreamEvent>;

    /// Drop the connection without waiting for the task to finish.
    /// The server-side operation keeps running.
    async fn release(&mut self);
}

/// Request/response side of the task protocol
#[async_trait]
pub trait TaskClient: Send + Sync {
    /// Ask the server to start a task. Fails without side effects on auth
    /// or validation errors.
    async fn start(&self, kind: TaskKind, repo: Option<Repo>) -> Result<Task>;

    /// Open the streaming transport for a key
    async fn attach(&self, key: &str) -> Result<Box<dyn TaskStream>>;

    /// Cancel a running task
    async fn cancel(&self, key: &str) -> Result<()>;
}

/// Decide how a stream ended.
///
/// A status frame is authoritative. Without one the closure is never taken
/// as success: a transport error or a bare close both yield `Interrupted`.
pub fn close_outcome(status: Option<TaskOutcome>, transport_error: Option<String>) -> TaskOutcome {
    match (status, transport_error) {
        (Some(outcome), _) => outcome,
        (None, Some(err)) => TaskOutcome::Interrupted { reason: err },
        (None, None) => TaskOutcome::Interrupted {
            reason: "stream closed without a status frame".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_close_is_not_success() {
        assert!(!close_outcome(None, None).is_success());
        assert!(matches!(
            close_outcome(None, Some("reset by peer".into())),
            TaskOutcome::Interrupted { reason } if reason == "reset by peer"
        ));
        assert!(close_outcome(Some(TaskOutcome::Succeeded), Some("late error".into())).is_success());
    }
}
