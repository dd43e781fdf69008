//! Route definitions

use crate::{handlers, AppState};
use axum::routing::{get, post};
use axum::Router;

/// API routes served at the root
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/agent", post(handlers::agent_webhook))
        .route("/search", get(handlers::search_documents))
}

/// OAuth handshake routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/authorization", get(handlers::oauth_authorization))
        .route("/callback", get(handlers::oauth_callback))
}

/// All routes combined
pub fn all_routes() -> Router<AppState> {
    Router::new()
        .merge(api_routes())
        .nest("/auth", auth_routes())
}
