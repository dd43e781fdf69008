//! Shopilot Copilot - typed client for the GitHub Copilot API
//!
//! Covers the three upstream calls the agent depends on: streaming chat
//! completions, plain chat completions, and embeddings.

pub mod client;
pub mod types;

pub use client::{ChatCompletionStream, CopilotAuth, CopilotClient};
pub use types::*;
