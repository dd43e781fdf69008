//! Shopilot CLI - manage the documentation index and run the agent server

use clap::{Parser, Subcommand};
use shopilot_agent::ContextInjector;
use shopilot_copilot::{ChatCompletionsRequest, ChatMessage, CopilotAuth, CopilotClient, Model};
use shopilot_core::{
    init_logging, AppConfig, ErrorContext, LoggingConfig, ShopilotError, ShopilotResult,
};
use shopilot_retrieval::{
    index_documents, CopilotEmbedder, DocumentStore, Embedder, IndexingConfig,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "shopilot")]
#[command(about = "A Copilot chat agent for Shopware 6 development")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent web server
    Server,

    /// Index documentation into the vector store
    Index {
        /// Number of files embedded concurrently
        #[arg(long, default_value = "4")]
        workers: usize,

        /// Directory to index instead of the configured one
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Search the indexed documentation
    Search {
        /// Search query
        query: String,

        /// Number of results to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Ask a question grounded in the indexed documentation
    Ask {
        /// Question to ask
        question: String,
    },

    /// Delete indexed documents by chunk ID
    Delete {
        /// Chunk IDs in the form `{relative path}_{chunk index}`
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ShopilotResult<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut logging_config = LoggingConfig::default();
    if cli.verbose {
        logging_config.level = "debug".to_string();
    }

    init_logging(&logging_config).map_err(|e| ShopilotError::Config {
        message: format!("Failed to initialize logging: {}", e),
        source: Some(e),
        context: ErrorContext::new("cli")
            .with_operation("init_logging")
            .with_suggestion("Check logging configuration"),
    })?;

    info!("Starting shopilot CLI v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Server => handle_server(config).await?,
        Commands::Index { workers, data_dir } => handle_index(workers, data_dir, &config).await?,
        Commands::Search { query, limit } => handle_search(query, limit, &config).await?,
        Commands::Ask { question } => handle_ask(question, &config).await?,
        Commands::Delete { ids } => handle_delete(ids, &config).await?,
    }

    Ok(())
}

async fn handle_server(config: AppConfig) -> ShopilotResult<()> {
    shopilot_web::server::start_server(config)
        .await
        .map_err(|e| ShopilotError::Internal {
            message: format!("Server terminated: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("cli").with_operation("server"),
        })
}

async fn handle_index(
    workers: usize,
    data_dir: Option<PathBuf>,
    config: &AppConfig,
) -> ShopilotResult<()> {
    let store = Arc::new(DocumentStore::open(&config.db_dir)?);
    let embedder = local_embedder(config)?;
    let data_dir = data_dir.unwrap_or_else(|| config.data_dir.clone());

    println!("📚 Indexing documents under {}...", data_dir.display());

    let stats = index_documents(
        store,
        embedder,
        IndexingConfig::new(data_dir).with_workers(workers),
    )
    .await?;

    println!("✅ Indexing finished!");
    println!(
        "📊 {} files, {} chunks indexed, {} unchanged, {} failures",
        stats.files, stats.chunks_indexed, stats.chunks_skipped, stats.failures
    );
    Ok(())
}

async fn handle_search(query: String, limit: usize, config: &AppConfig) -> ShopilotResult<()> {
    let store = DocumentStore::open(&config.db_dir)?;
    let embedder = local_embedder(config)?;

    let embedding = embedder
        .embed(vec![query])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ShopilotError::Retrieval {
            message: "embeddings response contained no vectors".to_string(),
            source: None,
            context: ErrorContext::new("cli").with_operation("search"),
        })?;

    let mut filter = HashMap::new();
    filter.insert("source".to_string(), "docs".to_string());
    let hits = store.query_by_vector(&embedding, limit, Some(&filter)).await;

    if hits.is_empty() {
        println!("No matching documents. Did you run `shopilot index` first?");
        return Ok(());
    }

    for hit in hits {
        println!("{} - {}", hit.similarity, hit.id);
    }
    Ok(())
}

async fn handle_ask(question: String, config: &AppConfig) -> ShopilotResult<()> {
    let (token, integration_id) = config.local_credentials()?;
    let auth = CopilotAuth::new(token, integration_id);
    let client = CopilotClient::new(&config.copilot_api_url);
    let store = Arc::new(DocumentStore::open(&config.db_dir)?);

    println!("🔍 Retrieving context...");
    let injector = ContextInjector::new(client.clone(), Arc::clone(&store));
    let messages = vec![ChatMessage::user(question)];
    let context = injector.build_context(&auth, &messages).await?;

    let mut outgoing = Vec::new();
    if let Some(system) = context.system_message {
        outgoing.push(system);
    }
    outgoing.extend(messages);

    println!("🤖 Asking the model...");
    let response = client
        .chat_completions(
            &auth,
            ChatCompletionsRequest {
                model: Model::Gpt4,
                messages: outgoing,
                tools: Vec::new(),
                stream: false,
            },
        )
        .await?;

    match response.choices.into_iter().next() {
        Some(choice) => {
            println!("\n{}", choice.message.content);
            if !context.references.is_empty() {
                println!("\n📋 Sources:");
                for reference in context.references {
                    println!("  {} ({})", reference.display_name, reference.url);
                }
            }
        }
        None => println!("The model returned no answer."),
    }
    Ok(())
}

async fn handle_delete(ids: Vec<String>, config: &AppConfig) -> ShopilotResult<()> {
    let store = DocumentStore::open(&config.db_dir)?;
    let removed = store.delete(&ids).await?;
    println!("🗑️ Removed {} of {} documents", removed, ids.len());
    Ok(())
}

/// Embedder using the locally configured credentials (GITHUB_TOKEN +
/// GITHUB_INTEGRATION_ID) rather than a forwarded request token
fn local_embedder(config: &AppConfig) -> ShopilotResult<Arc<dyn Embedder>> {
    let (token, integration_id) = config.local_credentials()?;
    let client = CopilotClient::new(&config.copilot_api_url);
    Ok(Arc::new(CopilotEmbedder::new(
        client,
        CopilotAuth::new(token, integration_id),
    )))
}
