//! Shopilot Agent - the streaming tool-augmented chat orchestrator
//!
//! Authenticates inbound Copilot webhooks, grounds the conversation in
//! retrieved Shopware documentation, drives a multi-round streaming exchange
//! with the model (dispatching tool calls between rounds) and emits the
//! result as server-sent events.

pub mod accumulator;
pub mod context;
pub mod orchestrator;
pub mod signature;
pub mod sse;
pub mod tools;

pub use accumulator::ToolCallAccumulator;
pub use context::{ContextInjector, InjectedContext, Reference};
pub use orchestrator::{Orchestrator, PreparedConversation};
pub use signature::{fetch_public_key, SignatureVerifier, SIGNATURE_HEADER};
pub use sse::{SseMessage, SseWriter};
pub use tools::{ToolHandler, ToolRegistry};
