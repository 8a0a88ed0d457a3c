//! Storage layer
//!
//! Project and theme files live on the local disk.

pub mod local;

pub use local::LocalFileStore;
