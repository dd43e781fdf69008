//! JSON-file backed vector store with cosine similarity search

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shopilot_core::ShopilotResult;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// One stored chunk of an indexed source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Chunk ID in the form `{relative path}_{chunk index}`
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A similarity search hit
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub similarity: f32,
    pub content: String,
    pub metadata: HashMap<String, String>,
}

/// Document store holding embedded chunks in memory, persisted as one JSON
/// file under the configured database directory
pub struct DocumentStore {
    documents: RwLock<HashMap<String, StoredDocument>>,
    storage_path: Option<PathBuf>,
}

impl DocumentStore {
    /// Open the store at `db_dir`, loading any previously saved documents
    pub fn open(db_dir: impl AsRef<Path>) -> ShopilotResult<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir)?;

        let storage_path = db_dir.join("documents.json");
        let documents = if storage_path.exists() {
            let data = std::fs::read_to_string(&storage_path)?;
            let docs: Vec<StoredDocument> = serde_json::from_str(&data)?;
            info!(
                count = docs.len(),
                path = %storage_path.display(),
                "Loaded document store"
            );
            docs.into_iter().map(|d| (d.id.clone(), d)).collect()
        } else {
            info!(path = %storage_path.display(), "Creating new document store");
            HashMap::new()
        };

        Ok(Self {
            documents: RwLock::new(documents),
            storage_path: Some(storage_path),
        })
    }

    /// Volatile store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            storage_path: None,
        }
    }

    /// Insert or replace documents by ID
    pub async fn upsert(&self, docs: Vec<StoredDocument>) -> ShopilotResult<usize> {
        let count = docs.len();
        {
            let mut documents = self.documents.write().await;
            for doc in docs {
                documents.insert(doc.id.clone(), doc);
            }
        }
        self.save().await?;
        Ok(count)
    }

    pub async fn get(&self, id: &str) -> Option<StoredDocument> {
        self.documents.read().await.get(id).cloned()
    }

    /// Remove documents by ID, returning how many actually existed
    pub async fn delete(&self, ids: &[String]) -> ShopilotResult<usize> {
        let removed = {
            let mut documents = self.documents.write().await;
            ids.iter()
                .filter(|id| documents.remove(id.as_str()).is_some())
                .count()
        };
        if removed > 0 {
            self.save().await?;
        }
        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Rank stored documents by cosine similarity to `query`, best first
    ///
    /// A filter restricts candidates to documents whose metadata contains
    /// every given key/value pair. Asking for more results than the store
    /// holds returns everything that matched.
    pub async fn query_by_vector(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&HashMap<String, String>>,
    ) -> Vec<SearchResult> {
        let documents = self.documents.read().await;

        let mut hits: Vec<SearchResult> = documents
            .values()
            .filter(|doc| matches_filter(doc, filter))
            .map(|doc| SearchResult {
                id: doc.id.clone(),
                similarity: cosine_similarity(query, &doc.embedding),
                content: doc.content.clone(),
                metadata: doc.metadata.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        hits
    }

    async fn save(&self) -> ShopilotResult<()> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        let data = {
            let documents = self.documents.read().await;
            let mut docs: Vec<&StoredDocument> = documents.values().collect();
            docs.sort_by(|a, b| a.id.cmp(&b.id));
            serde_json::to_string(&docs)?
        };

        tokio::fs::write(path, data).await?;
        debug!(path = %path.display(), "Saved document store");
        Ok(())
    }
}

fn matches_filter(doc: &StoredDocument, filter: Option<&HashMap<String, String>>) -> bool {
    match filter {
        Some(filter) => filter.iter().all(|(k, v)| doc.metadata.get(k) == Some(v)),
        None => true,
    }
}

/// Cosine similarity between two vectors, 0.0 when lengths differ or a
/// vector has zero magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
