//! Task Modal controller
//!
//! Pure reducer over modal events. It owns no transport or terminal; the
//! effects it returns tell the caller what to open, render, and release.

use crate::notice::Notice;
use bytes::Bytes;
use hollow_types::{TaskKind, TaskOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalEvent {
    Show { key: String, kind: TaskKind },
    Output(Bytes),
    StreamClosed(TaskOutcome),
    CloseRequested,
    Unmount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalEffect {
    OpenStream(String),
    Render(Bytes),
    ReloadTree,
    Notify(Notice),
    Dismiss,
    ReleaseStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModalPhase {
    #[default]
    Hidden,
    Streaming,
    Closed,
}

#[derive(Debug, Default)]
pub struct TaskModal {
    phase: ModalPhase,
    key: Option<String>,
    kind: Option<TaskKind>,
    outcome: Option<TaskOutcome>,
}

impl TaskModal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ModalPhase {
        self.phase
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn outcome(&self) -> Option<&TaskOutcome> {
        self.outcome.as_ref()
    }

    /// The modal cannot be dismissed while output is still streaming
    pub fn can_close(&self) -> bool {
        self.phase != ModalPhase::Streaming
    }

    pub fn ok_enabled(&self) -> bool {
        self.phase == ModalPhase::Closed
    }

    pub fn handle(&mut self, event: ModalEvent) -> Vec<ModalEffect> {
        match (self.phase, event) {
            (ModalPhase::Streaming, ModalEvent::Show { .. }) => Vec::new(),
            (_, ModalEvent::Show { key, kind }) => {
                self.phase = ModalPhase::Streaming;
                self.key = Some(key.clone());
                self.kind = Some(kind);
                self.outcome = None;
                vec![ModalEffect::OpenStream(key)]
            }

            (ModalPhase::Streaming, ModalEvent::Output(bytes)) => vec![ModalEffect::Render(bytes)],
            (_, ModalEvent::Output(_)) => Vec::new(),

            (ModalPhase::Streaming, ModalEvent::StreamClosed(outcome)) => {
                self.phase = ModalPhase::Closed;
                let mut effects = vec![ModalEffect::ReloadTree];
                if !outcome.is_success() {
                    if let Some(kind) = self.kind {
                        effects.push(ModalEffect::Notify(Notice::TaskFinished {
                            kind,
                            outcome: outcome.clone(),
                        }));
                    }
                }
                self.outcome = Some(outcome);
                effects
            }
            // A late close after the first one never reloads twice
            (_, ModalEvent::StreamClosed(_)) => Vec::new(),

            (ModalPhase::Streaming, ModalEvent::CloseRequested) => Vec::new(),
            (ModalPhase::Closed, ModalEvent::CloseRequested) => {
                self.phase = ModalPhase::Hidden;
                vec![ModalEffect::Dismiss]
            }
            (ModalPhase::Hidden, ModalEvent::CloseRequested) => Vec::new(),

            (ModalPhase::Streaming, ModalEvent::Unmount) => {
                self.phase = ModalPhase::Hidden;
                vec![ModalEffect::ReleaseStream]
            }
            (_, ModalEvent::Unmount) => {
                self.phase = ModalPhase::Hidden;
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn show(modal: &mut TaskModal, kind: TaskKind) -> Vec<ModalEffect> {
        modal.handle(ModalEvent::Show {
            key: "k1".to_string(),
            kind,
        })
    }

    #[test]
    fn test_publish_scenario() {
        let mut modal = TaskModal::new();
        assert_eq!(
            show(&mut modal, TaskKind::Publish),
            vec![ModalEffect::OpenStream("k1".to_string())]
        );
        assert!(!modal.can_close());
        assert!(!modal.ok_enabled());

        for chunk in ["building...\n", "done\n"] {
            assert_eq!(
                modal.handle(ModalEvent::Output(Bytes::from(chunk))),
                vec![ModalEffect::Render(Bytes::from(chunk))]
            );
        }

        // Close is rejected while streaming
        assert!(modal.handle(ModalEvent::CloseRequested).is_empty());
        assert_eq!(modal.phase(), ModalPhase::Streaming);

        let effects = modal.handle(ModalEvent::StreamClosed(TaskOutcome::Succeeded));
        assert_eq!(effects, vec![ModalEffect::ReloadTree]);
        assert!(modal.ok_enabled());
        assert!(modal.can_close());

        assert!(modal
            .handle(ModalEvent::StreamClosed(TaskOutcome::Succeeded))
            .is_empty());

        assert_eq!(
            modal.handle(ModalEvent::CloseRequested),
            vec![ModalEffect::Dismiss]
        );
        assert_eq!(modal.phase(), ModalPhase::Hidden);
    }

    #[test]
    fn test_failure_reloads_and_notifies() {
        let mut modal = TaskModal::new();
        show(&mut modal, TaskKind::Push);
        let outcome = TaskOutcome::Interrupted {
            reason: "connection reset".to_string(),
        };
        let effects = modal.handle(ModalEvent::StreamClosed(outcome.clone()));
        assert_eq!(effects.len(), 2);
        assert_eq!(effects[0], ModalEffect::ReloadTree);
        assert_eq!(
            effects[1],
            ModalEffect::Notify(Notice::TaskFinished {
                kind: TaskKind::Push,
                outcome: outcome.clone()
            })
        );
        assert_eq!(modal.outcome(), Some(&outcome));
    }

    #[test]
    fn test_unmount_releases_stream() {
        let mut modal = TaskModal::new();
        show(&mut modal, TaskKind::Pull);
        assert_eq!(
            modal.handle(ModalEvent::Unmount),
            vec![ModalEffect::ReleaseStream]
        );
        // Output arriving after release is dropped
        assert!(modal
            .handle(ModalEvent::Output(Bytes::from_static(b"late")))
            .is_empty());
        assert!(modal
            .handle(ModalEvent::StreamClosed(TaskOutcome::Succeeded))
            .is_empty());
    }

    #[test]
    fn test_show_ignored_while_streaming() {
        let mut modal = TaskModal::new();
        show(&mut modal, TaskKind::Pull);
        assert!(modal
            .handle(ModalEvent::Show {
                key: "k2".to_string(),
                kind: TaskKind::Push
            })
            .is_empty());
        assert_eq!(modal.key(), Some("k1"));
    }
}
