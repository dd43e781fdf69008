//! Embedding access for indexing and local search

use async_trait::async_trait;
use shopilot_copilot::{CopilotAuth, CopilotClient};
use shopilot_core::ShopilotResult;

/// Turns text into embedding vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> ShopilotResult<Vec<Vec<f32>>>;
}

/// Embedder backed by the Copilot embeddings endpoint
///
/// Holds service credentials so the indexer and the local search endpoint
/// can embed without an inbound request token.
pub struct CopilotEmbedder {
    client: CopilotClient,
    auth: CopilotAuth,
}

impl CopilotEmbedder {
    pub fn new(client: CopilotClient, auth: CopilotAuth) -> Self {
        Self { client, auth }
    }
}

#[async_trait]
impl Embedder for CopilotEmbedder {
    async fn embed(&self, texts: Vec<String>) -> ShopilotResult<Vec<Vec<f32>>> {
        self.client.embeddings(&self.auth, texts).await
    }
}
