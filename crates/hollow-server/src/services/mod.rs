//! Business logic services

pub mod auth;
pub mod orchestrator;
pub mod process;
pub mod task_hub;

pub use auth::AuthService;
pub use orchestrator::{Orchestrator, OrchestratorError, TaskBackend};
pub use process::ProcessBackend;
pub use task_hub::{TaskHub, TaskOutput};
