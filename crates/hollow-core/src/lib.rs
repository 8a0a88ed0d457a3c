//! Hollow Core
//!
//! Client-side editor engine: session tracking, debounced saves, file tree
//! reconciliation, and the task lifecycle. Transports and storage are reached
//! through the traits in [`ports`].

pub use hollow_types::*;

pub mod editor;
pub mod error;
pub mod modal;
pub mod notice;
pub mod pipeline;
pub mod ports;
pub mod session;
pub mod task;
pub mod tree;

pub use editor::{Command, Editor, EditorEffect, EditorEvent, EditorState};
pub use error::{CoreError, Result};
pub use modal::{ModalEffect, ModalEvent, ModalPhase, TaskModal};
pub use notice::Notice;
pub use pipeline::MutationPipeline;
pub use session::{SessionStore, SharedSession};
pub use task::{TaskMachine, TaskPhase};
