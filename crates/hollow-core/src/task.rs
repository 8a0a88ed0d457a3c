//! Client-side task lifecycle: `Idle → Requested → Streaming → Closed`

use crate::{CoreError, Result};
use hollow_types::{TaskKind, TaskOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TaskPhase {
    #[default]
    Idle,
    /// Start request issued; `key` is set once the server answers
    Requested { kind: TaskKind, key: Option<String> },
    Streaming { kind: TaskKind, key: String },
    Closed {
        kind: TaskKind,
        key: String,
        outcome: TaskOutcome,
    },
}

impl TaskPhase {
    pub fn key(&self) -> Option<&str> {
        match self {
            TaskPhase::Idle => None,
            TaskPhase::Requested { key, .. } => key.as_deref(),
            TaskPhase::Streaming { key, .. } | TaskPhase::Closed { key, .. } => Some(key),
        }
    }

    pub fn kind(&self) -> Option<TaskKind> {
        match self {
            TaskPhase::Idle => None,
            TaskPhase::Requested { kind, .. }
            | TaskPhase::Streaming { kind, .. }
            | TaskPhase::Closed { kind, .. } => Some(*kind),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            TaskPhase::Idle => "idle",
            TaskPhase::Requested { .. } => "requested",
            TaskPhase::Streaming { .. } => "streaming",
            TaskPhase::Closed { .. } => "closed",
        }
    }
}

/// State machine for one task slot.
///
/// A failed start request returns the slot to `Idle`; nothing is streamed.
#[derive(Debug, Default)]
pub struct TaskMachine {
    phase: TaskPhase,
}

impl TaskMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &TaskPhase {
        &self.phase
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.phase, TaskPhase::Streaming { .. })
    }

    /// Issue a start request. Allowed from `Idle` and after a closed task.
    pub fn request(&mut self, kind: TaskKind) -> Result<()> {
        match self.phase {
            TaskPhase::Idle | TaskPhase::Closed { .. } => {
                self.phase = TaskPhase::Requested { kind, key: None };
                Ok(())
            }
            _ => Err(CoreError::transition(self.phase.name(), "request")),
        }
    }

    pub fn start_failed(&mut self) -> Result<()> {
        match self.phase {
            TaskPhase::Requested { key: None, .. } => {
                self.phase = TaskPhase::Idle;
                Ok(())
            }
            _ => Err(CoreError::transition(self.phase.name(), "start_failed")),
        }
    }

    pub fn key_received(&mut self, key: impl Into<String>) -> Result<()> {
        match &mut self.phase {
            TaskPhase::Requested { key: slot @ None, .. } => {
                *slot = Some(key.into());
                Ok(())
            }
            other => Err(CoreError::transition(other.name(), "key_received")),
        }
    }

    /// The transport for the requested key is open
    pub fn stream_opened(&mut self) -> Result<()> {
        match std::mem::take(&mut self.phase) {
            TaskPhase::Requested {
                kind,
                key: Some(key),
            } => {
                self.phase = TaskPhase::Streaming { kind, key };
                Ok(())
            }
            other => {
                let err = CoreError::transition(other.name(), "stream_opened");
                self.phase = other;
                Err(err)
            }
        }
    }

    /// The transport closed. Closing before a stream was opened (attach
    /// failure) is also accepted so the slot never stays stuck.
    pub fn stream_closed(&mut self, outcome: TaskOutcome) -> Result<()> {
        match std::mem::take(&mut self.phase) {
            TaskPhase::Requested {
                kind,
                key: Some(key),
            }
            | TaskPhase::Streaming { kind, key } => {
                self.phase = TaskPhase::Closed { kind, key, outcome };
                Ok(())
            }
            other => {
                let err = CoreError::transition(other.name(), "stream_closed");
                self.phase = other;
                Err(err)
            }
        }
    }

    /// Return to `Idle` once the closed task has been acknowledged
    pub fn reset(&mut self) -> Result<()> {
        match self.phase {
            TaskPhase::Closed { .. } | TaskPhase::Idle => {
                self.phase = TaskPhase::Idle;
                Ok(())
            }
            _ => Err(CoreError::transition(self.phase.name(), "reset")),
        }
    }
}
