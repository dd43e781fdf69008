//! Local document search over the indexed Shopware docs

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use shopilot_core::{ErrorContext, ShopilotError};
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::error::WebError;
use crate::state::AppState;

fn default_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchParams {
    /// Free text matched against the indexed documentation
    pub query: String,
    /// Maximum number of hits
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchHit {
    pub id: String,
    pub similarity: f32,
    pub content: String,
}

/// Search the indexed documentation
#[utoipa::path(
    get,
    path = "/search",
    tag = "Search",
    summary = "Search indexed documentation",
    params(SearchParams),
    responses(
        (status = 200, description = "Ranked hits", body = [SearchHit]),
        (status = 400, description = "Missing or empty query")
    )
)]
pub async fn search_documents(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHit>>, WebError> {
    if params.query.trim().is_empty() {
        return Err(ShopilotError::MalformedRequest {
            message: "query must not be empty".to_string(),
            source: None,
            context: ErrorContext::new("search").with_operation("search_documents"),
        }
        .into());
    }

    let vectors = state.embedder.embed(vec![params.query.clone()]).await?;
    let embedding = vectors.into_iter().next().ok_or_else(|| {
        ShopilotError::Retrieval {
            message: "embedding service returned no vector".to_string(),
            source: None,
            context: ErrorContext::new("search").with_operation("search_documents"),
        }
    })?;

    let filter = HashMap::from([("source".to_string(), "docs".to_string())]);
    let hits = state
        .store
        .query_by_vector(&embedding, params.limit, Some(&filter))
        .await;
    debug!(query = %params.query, hits = hits.len(), "Search completed");

    Ok(Json(
        hits.into_iter()
            .map(|hit| SearchHit {
                id: hit.id,
                similarity: hit.similarity,
                content: hit.content,
            })
            .collect(),
    ))
}
