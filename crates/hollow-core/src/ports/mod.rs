//! Ports (traits) implemented by the storage, persistence, and transport adapters

pub mod persistence;
pub mod storage;
pub mod task;

pub use persistence::*;
pub use storage::*;
pub use task::*;
