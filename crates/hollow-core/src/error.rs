//! Error types for the editor engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Request failed ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid transition: {event} while {state}")]
    InvalidTransition { state: String, event: String },
}

impl CoreError {
    /// Whether the failure should trigger a re-authentication prompt
    pub fn is_auth(&self) -> bool {
        matches!(self, CoreError::Unauthorized)
            || matches!(self, CoreError::Http { status: 401, .. })
    }

    pub fn transition(state: impl std::fmt::Display, event: &str) -> Self {
        CoreError::InvalidTransition {
            state: state.to_string(),
            event: event.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}
