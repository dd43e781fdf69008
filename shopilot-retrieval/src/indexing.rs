//! Filesystem indexing pipeline
//!
//! Walks the data directory, chunks eligible files, embeds new or changed
//! chunks and upserts them into the document store. Chunk IDs are
//! `{path}_{index}` with the path taken relative to the data directory's
//! parent, so the same tree indexes to the same IDs wherever it lives.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use shopilot_core::{process_concurrently, ErrorContext, ShopilotError, ShopilotResult};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::embedder::Embedder;
use crate::store::{DocumentStore, StoredDocument};

/// File extensions eligible for indexing
pub const INDEXED_EXTENSIONS: &[&str] = &["md", "js", "php", "scss", "css", "twig"];

/// Paths containing this fragment are excluded from the walk
const EXCLUDED_FRAGMENT: &str = "draco";

const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct IndexingConfig {
    pub data_dir: PathBuf,
    pub workers: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl IndexingConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            workers: 4,
            chunk_size: 12_000,
            chunk_overlap: 30,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

/// Outcome of one indexing run
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexStats {
    pub files: usize,
    pub chunks_indexed: usize,
    pub chunks_skipped: usize,
    pub failures: usize,
}

/// Index every eligible file under the configured data directory
///
/// Files are processed concurrently. A failing file is logged and counted
/// but does not abort the run.
pub async fn index_documents(
    store: Arc<DocumentStore>,
    embedder: Arc<dyn Embedder>,
    config: IndexingConfig,
) -> ShopilotResult<IndexStats> {
    let files = collect_source_files(&config.data_dir)?;
    info!(
        files = files.len(),
        data_dir = %config.data_dir.display(),
        workers = config.workers,
        "Starting indexing run"
    );

    let total_files = files.len();
    let data_dir = config.data_dir.clone();
    let chunk_size = config.chunk_size;
    let chunk_overlap = config.chunk_overlap;

    let results = process_concurrently(files, config.workers.max(1), move |path| {
        let store = Arc::clone(&store);
        let embedder = Arc::clone(&embedder);
        let data_dir = data_dir.clone();
        async move {
            index_file(
                &store,
                embedder.as_ref(),
                &data_dir,
                &path,
                chunk_size,
                chunk_overlap,
            )
            .await
        }
    })
    .await;

    let mut stats = IndexStats {
        files: total_files,
        ..Default::default()
    };
    for result in results {
        match result {
            Ok(outcome) => {
                stats.chunks_indexed += outcome.indexed;
                stats.chunks_skipped += outcome.skipped;
            }
            Err(e) => {
                stats.failures += 1;
                warn!(error = %e, "Failed to index file");
            }
        }
    }

    info!(
        indexed = stats.chunks_indexed,
        skipped = stats.chunks_skipped,
        failures = stats.failures,
        "Indexing run finished"
    );
    Ok(stats)
}

/// Collect all indexable files under `data_dir`
pub fn collect_source_files(data_dir: &Path) -> ShopilotResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(data_dir).follow_links(false) {
        let entry = entry.map_err(|e| ShopilotError::Store {
            message: format!("failed to read directory entry: {e}"),
            source: Some(Box::new(e)),
            context: ErrorContext::new("indexing").with_operation("collect_source_files"),
        })?;

        let path = entry.path();
        if path.to_string_lossy().contains(EXCLUDED_FRAGMENT) {
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let eligible = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| INDEXED_EXTENSIONS.contains(&ext));
        if eligible {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

#[derive(Debug, Default, Clone, Copy)]
struct FileOutcome {
    indexed: usize,
    skipped: usize,
}

async fn index_file(
    store: &DocumentStore,
    embedder: &dyn Embedder,
    data_dir: &Path,
    path: &Path,
    chunk_size: usize,
    chunk_overlap: usize,
) -> ShopilotResult<FileOutcome> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ShopilotError::Store {
            message: format!("failed to read {}: {e}", path.display()),
            source: Some(Box::new(e)),
            context: ErrorContext::new("indexing")
                .with_operation("index_file")
                .with_metadata("file", &path.to_string_lossy()),
        })?;

    let content = strip_frontmatter(&raw);
    if content.trim().is_empty() {
        return Ok(FileOutcome::default());
    }

    let relative = path.strip_prefix(data_dir).unwrap_or(path);
    let doc_path = match data_dir.file_name() {
        Some(name) => Path::new(name).join(relative),
        None => path.to_path_buf(),
    };
    let path_str = doc_path.to_string_lossy().to_string();
    let source = relative
        .components()
        .next()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .unwrap_or_default();

    let chunks = split_text(content, chunk_size, chunk_overlap);

    let mut outcome = FileOutcome::default();
    let mut pending: Vec<(String, String)> = Vec::new();

    for (index, chunk) in chunks.into_iter().enumerate() {
        let id = format!("{path_str}_{index}");
        if let Some(existing) = store.get(&id).await {
            if existing.content == chunk {
                outcome.skipped += 1;
                continue;
            }
        }
        pending.push((id, chunk));
    }

    if pending.is_empty() {
        debug!(file = %path.display(), "All chunks up to date");
        return Ok(outcome);
    }

    let texts: Vec<String> = pending.iter().map(|(_, chunk)| chunk.clone()).collect();
    let embeddings = embedder.embed(texts).await?;
    if embeddings.len() != pending.len() {
        return Err(ShopilotError::Store {
            message: format!(
                "embedding count mismatch: {} chunks, {} vectors",
                pending.len(),
                embeddings.len()
            ),
            source: None,
            context: ErrorContext::new("indexing")
                .with_operation("index_file")
                .with_metadata("file", &path_str),
        });
    }

    let docs: Vec<StoredDocument> = pending
        .into_iter()
        .zip(embeddings)
        .map(|((id, content), embedding)| {
            let mut metadata = HashMap::new();
            metadata.insert("source".to_string(), source.clone());
            metadata.insert("file".to_string(), path_str.clone());
            StoredDocument {
                id,
                content,
                embedding,
                metadata,
            }
        })
        .collect();

    outcome.indexed = store.upsert(docs).await?;
    debug!(
        file = %path.display(),
        indexed = outcome.indexed,
        skipped = outcome.skipped,
        "Indexed file"
    );
    Ok(outcome)
}

static FRONTMATTER: OnceLock<Regex> = OnceLock::new();

/// Remove a leading YAML frontmatter block from Markdown content
pub fn strip_frontmatter(content: &str) -> &str {
    let pattern = FRONTMATTER.get_or_init(|| {
        Regex::new(r"(?s)\A---\n.*?---\n").expect("frontmatter pattern is valid")
    });
    match pattern.find(content) {
        Some(m) => &content[m.end()..],
        None => content,
    }
}

/// Split text into chunks of at most `chunk_size` characters, preferring
/// paragraph and line boundaries, with consecutive chunks sharing roughly
/// `chunk_overlap` characters
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chunk_overlap = chunk_overlap.min(chunk_size.saturating_sub(1));

    split_with_separators(text, SEPARATORS, chunk_size, chunk_overlap)
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .collect()
}

fn split_with_separators(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return vec![text.to_string()];
    }

    let mut separator: &str = "";
    let mut rest: &[&str] = &[];
    for (idx, sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            break;
        }
        if text.contains(*sep) {
            separator = sep;
            rest = &separators[idx + 1..];
            break;
        }
    }

    if separator.is_empty() {
        return split_by_chars(text, chunk_size, chunk_overlap);
    }

    let mut pieces = Vec::new();
    for piece in text.split(separator) {
        if char_len(piece) > chunk_size {
            pieces.extend(split_with_separators(
                piece,
                rest,
                chunk_size,
                chunk_overlap,
            ));
        } else {
            pieces.push(piece.to_string());
        }
    }

    merge_pieces(pieces, separator, chunk_size, chunk_overlap)
}

fn merge_pieces(
    pieces: Vec<String>,
    separator: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut window: VecDeque<String> = VecDeque::new();
    let mut window_len = 0usize;

    for piece in pieces {
        let piece_len = char_len(&piece);
        let added = if window.is_empty() {
            piece_len
        } else {
            piece_len + sep_len
        };

        if !window.is_empty() && window_len + added > chunk_size {
            chunks.push(join_window(&window, separator));
            // Keep a tail of whole pieces no longer than the overlap
            while window_len > chunk_overlap {
                let Some(front) = window.pop_front() else {
                    break;
                };
                window_len -= char_len(&front);
                if !window.is_empty() {
                    window_len -= sep_len;
                }
            }
        }

        window_len += if window.is_empty() {
            piece_len
        } else {
            piece_len + sep_len
        };
        window.push_back(piece);
    }

    if !window.is_empty() {
        chunks.push(join_window(&window, separator));
    }

    chunks
}

fn join_window(window: &VecDeque<String>, separator: &str) -> String {
    window
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(separator)
}

fn split_by_chars(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
