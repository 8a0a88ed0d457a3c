//! Hollow Types - Pure type definitions shared by the editor client and server
//!
//! This crate contains only serde data types with no async runtime dependencies,
//! so the same definitions describe the HTTP/WS wire format and the persisted
//! client session record.

pub mod file;
pub mod message;
pub mod repo;
pub mod session;
pub mod task;

pub use file::*;
pub use message::*;
pub use repo::*;
pub use session::*;
pub use task::*;

use thiserror::Error;

/// Errors raised while parsing closed enums from strings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("unknown bucket: {0}")]
    UnknownBucket(String),

    #[error("unknown task kind: {0}")]
    UnknownTaskKind(String),
}
