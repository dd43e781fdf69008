//! Shopilot Retrieval - document store, embeddings and the indexing pipeline
//!
//! Indexed documentation chunks live in a JSON-file backed vector store and
//! are retrieved by cosine similarity against Copilot embeddings.

pub mod embedder;
pub mod indexing;
pub mod store;

pub use embedder::{CopilotEmbedder, Embedder};
pub use indexing::{index_documents, IndexStats, IndexingConfig, INDEXED_EXTENSIONS};
pub use store::{DocumentStore, SearchResult, StoredDocument};
