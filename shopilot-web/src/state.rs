//! Shared application state

use std::sync::Arc;

use shopilot_agent::{fetch_public_key, ContextInjector, Orchestrator, SignatureVerifier, ToolRegistry};
use shopilot_copilot::{CopilotAuth, CopilotClient};
use shopilot_core::AppConfig;
use shopilot_retrieval::{CopilotEmbedder, DocumentStore, Embedder};
use tracing::{info, warn};

use crate::error::WebResult;

/// State shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Absent only when signature verification is disabled for debugging
    pub verifier: Option<Arc<SignatureVerifier>>,
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<DocumentStore>,
    pub embedder: Arc<dyn Embedder>,
}

impl AppState {
    /// Wire up the application: key bootstrap, store, orchestrator
    pub async fn new(config: AppConfig) -> WebResult<Self> {
        let verifier = if config.debug_skip_verification {
            warn!("Request signature verification is DISABLED, do not run this in production");
            None
        } else {
            let verifier = fetch_public_key(&config.github_api_url).await?;
            info!("Fetched the request signing key");
            Some(Arc::new(verifier))
        };

        let store = Arc::new(DocumentStore::open(&config.db_dir)?);
        info!(documents = store.len().await, "Opened document store");

        let client = CopilotClient::new(&config.copilot_api_url);
        let injector = ContextInjector::new(client.clone(), Arc::clone(&store));
        let tools = ToolRegistry::standard(&config.github_api_url);
        let orchestrator = Arc::new(Orchestrator::new(client.clone(), injector, tools));

        // Locally initiated calls (the search endpoint) authenticate with the
        // configured service credentials, not a forwarded request token.
        let local_auth = CopilotAuth::new(
            config.github_token.clone().unwrap_or_default(),
            config.github_integration_id.clone().unwrap_or_default(),
        );
        let embedder: Arc<dyn Embedder> = Arc::new(CopilotEmbedder::new(client, local_auth));

        Ok(Self {
            config: Arc::new(config),
            verifier,
            orchestrator,
            store,
            embedder,
        })
    }
}
