//! Long-running task types and the streaming control protocol

use crate::TypesError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Operations that run as server-side tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Pull,
    Push,
    Publish,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Pull => "pull",
            TaskKind::Push => "push",
            TaskKind::Publish => "publish",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pull" => Ok(TaskKind::Pull),
            "push" => Ok(TaskKind::Push),
            "publish" => Ok(TaskKind::Publish),
            other => Err(TypesError::UnknownTaskKind(other.to_string())),
        }
    }
}

/// Handle returned when a task starts. The key is the only way to attach
/// a stream to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub key: String,
    pub kind: TaskKind,
}

/// How a task ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed { error: String },
    Cancelled,
    /// The stream closed without a status frame. Only produced client-side.
    Interrupted { reason: String },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded)
    }
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Succeeded => write!(f, "succeeded"),
            TaskOutcome::Failed { error } => write!(f, "failed: {}", error),
            TaskOutcome::Cancelled => write!(f, "cancelled"),
            TaskOutcome::Interrupted { reason } => write!(f, "interrupted: {}", reason),
        }
    }
}

/// Server-side lifecycle of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Running,
    Finished { outcome: TaskOutcome },
}

impl TaskState {
    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }
}

/// Snapshot returned by the task status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub key: String,
    pub kind: TaskKind,
    pub project_id: i64,
    #[serde(flatten)]
    pub state: TaskState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Control frames sent as text messages on the task stream.
///
/// Process output travels as binary frames; exactly one `Status` frame is
/// sent before the server closes the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskFrame {
    Status { outcome: TaskOutcome },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_frame_format() {
        let frame = TaskFrame::Status {
            outcome: TaskOutcome::Failed {
                error: "exit status 1".to_string(),
            },
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"type":"status","outcome":{"status":"failed","error":"exit status 1"}}"#
        );
        let back: TaskFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_task_info_flattens_state() {
        let info = TaskInfo {
            key: "k1".to_string(),
            kind: TaskKind::Publish,
            project_id: 0,
            state: TaskState::Finished {
                outcome: TaskOutcome::Succeeded,
            },
            started_at: Utc::now(),
            finished_at: None,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["state"], "finished");
        assert_eq!(value["outcome"]["status"], "succeeded");
        assert_eq!(value["kind"], "publish");
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("push".parse::<TaskKind>().unwrap(), TaskKind::Push);
        assert!("deploy".parse::<TaskKind>().is_err());
    }
}
