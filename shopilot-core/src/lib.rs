//! Shopilot Core - shared error, logging, configuration and async utilities
//!
//! This crate defines the foundations every other shopilot crate builds on

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use logging::*;

// Re-export commonly used external types
pub use tokio;
pub use tracing;
