#![forbid(unsafe_code)]

//! Dependency-aware orchestration of delegated work sessions.

pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod runner;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
