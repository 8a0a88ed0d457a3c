//! User-visible notifications (toast equivalents)

use hollow_types::{TaskKind, TaskOutcome};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Saved { path: String },
    WriteFailed { path: String, error: String },
    AuthRequired,
    PersistFailed { error: String },
    TaskStartFailed { kind: TaskKind, error: String },
    TaskFinished { kind: TaskKind, outcome: TaskOutcome },
    CommandFailed { command: String, error: String },
}

impl Notice {
    /// Whether the notice reports a problem
    pub fn is_error(&self) -> bool {
        match self {
            Notice::Saved { .. } => false,
            Notice::TaskFinished { outcome, .. } => !outcome.is_success(),
            _ => true,
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::Saved { path } => write!(f, "saved {}", path),
            Notice::WriteFailed { path, error } => write!(f, "save {} failed: {}", path, error),
            Notice::AuthRequired => write!(f, "login required"),
            Notice::PersistFailed { error } => write!(f, "session not persisted: {}", error),
            Notice::TaskStartFailed { kind, error } => write!(f, "{} not started: {}", kind, error),
            Notice::TaskFinished { kind, outcome } => write!(f, "{} {}", kind, outcome),
            Notice::CommandFailed { command, error } => write!(f, "{} failed: {}", command, error),
        }
    }
}

pub type NoticeSender = mpsc::UnboundedSender<Notice>;
pub type NoticeReceiver = mpsc::UnboundedReceiver<Notice>;

pub fn channel() -> (NoticeSender, NoticeReceiver) {
    mpsc::unbounded_channel()
}
