//! Request handlers

pub mod agent;
pub mod health;
pub mod oauth;
pub mod search;

pub use agent::agent_webhook;
pub use health::{health_check, HealthResponse};
pub use oauth::{oauth_authorization, oauth_callback};
pub use search::{search_documents, SearchHit};
