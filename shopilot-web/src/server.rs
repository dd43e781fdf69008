//! Shopilot Web Server
//!
//! Main web server implementation using Axum.

use crate::{create_app, AppState, WebError, WebResult};
use axum::serve;
use shopilot_core::AppConfig;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Main shopilot web server
pub struct ShopilotServer {
    config: AppConfig,
    state: AppState,
}

impl ShopilotServer {
    /// Create a new server: bootstraps the signing key and opens the store
    pub async fn new(config: AppConfig) -> WebResult<Self> {
        let state = AppState::new(config.clone()).await?;

        Ok(Self { config, state })
    }

    /// Start the web server
    pub async fn start(self) -> WebResult<()> {
        let address = self.config.address();

        info!("🚀 Starting Shopilot Web Server");
        info!("📍 Server address: http://{}", address);
        info!("📚 API docs: http://{}/docs", address);

        let app = create_app(self.state.clone());

        let listener = TcpListener::bind(&address)
            .await
            .map_err(WebError::Server)?;

        info!("✅ Server listening on http://{}", address);

        if let Err(e) = serve(listener, app).await {
            error!("❌ Server error: {}", e);
            return Err(WebError::Server(e));
        }

        Ok(())
    }

    /// Get server configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Get application state
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// Convenience function to start a server from a loaded configuration
pub async fn start_server(config: AppConfig) -> WebResult<()> {
    let server = ShopilotServer::new(config).await?;
    server.start().await
}
