//! HTTP handlers

pub mod auth;
pub mod config;
pub mod files;
pub mod health;
pub mod tasks;
pub mod ws;

pub use health::health;
