//! Omni Memory daemon - semantic memory tools over HTTP

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use omni_memory::MemoryError;
use omni_memory::config::Config;
use omni_memory::embedding;
use omni_memory::error::Result;
use omni_memory::memory::MemoryService;
use omni_memory::server::{self, AppState};
use omni_memory::storage;
use omni_memory::tools::MemoryTools;

/// Omni Memory - store and recall agent memories by meaning
#[derive(Parser)]
#[command(name = "omni-memory")]
#[command(about = "Semantic memory engine for multi-agent LLM systems")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the tool server (default command)
    #[command(name = "serve")]
    Serve,

    /// Create the schema and check the store, then exit
    #[command(name = "init")]
    Init,

    /// Build or rebuild the cosine vector index
    #[command(name = "index")]
    Index,

    /// Show record counts
    #[command(name = "stats")]
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete memories older than the given age
    #[command(name = "purge")]
    Purge {
        /// Age threshold in days
        #[arg(long, default_value_t = 30)]
        older_than_days: u32,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    tracing::debug!("Config loaded: {:?}", config);

    match cli.command {
        None | Some(Command::Serve) => serve(config).await,
        Some(Command::Init) => init(config).await,
        Some(Command::Index) => index(config).await,
        Some(Command::Stats { json }) => stats(config, json).await,
        Some(Command::Purge { older_than_days }) => purge(config, older_than_days).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,omni_memory=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => {
            let default_paths = [
                dirs::home_dir().map(|h| h.join(".omni-memory").join("config.toml")),
                dirs::config_dir().map(|c| c.join("omni-memory").join("config.toml")),
                Some(PathBuf::from("config.toml")),
            ];
            match default_paths.into_iter().flatten().find(|p| p.exists()) {
                Some(path) => path,
                None => {
                    tracing::info!("No config file found, using defaults");
                    return Ok(Config::default());
                }
            }
        }
    };

    tracing::info!("Loading config from: {}", path.display());
    let content = std::fs::read_to_string(&path).map_err(|e| {
        MemoryError::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    Config::from_toml_str(&content)
}

/// Open the store and provider and wire them into the service
async fn build_service(config: &Config) -> Result<Arc<MemoryService>> {
    tracing::info!("Opening {:?} store", config.storage.backend);
    let store = storage::open_store(config).await?;

    tracing::info!("Initializing {:?} embedding provider", config.embedding.provider);
    let embeddings = embedding::from_config(&config.embedding)?;

    let service = MemoryService::new(store, embeddings, config.recall.clone())?;
    Ok(Arc::new(service))
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting Omni Memory daemon");

    let service = build_service(&config).await?;
    tracing::info!(
        store = service.store_backend(),
        embeddings = service.embedding_provider(),
        strategy = ?config.recall.strategy,
        "Memory service ready"
    );

    let state = Arc::new(AppState {
        tools: MemoryTools::new(Arc::clone(&service)),
    });

    let served = server::serve(&config.server, state).await;
    service.shutdown().await?;
    served
}

async fn init(config: Config) -> Result<()> {
    let store = storage::open_store(&config).await?;
    println!(
        "Store '{}' ready ({} dimensions)",
        store.name(),
        store.dimension()
    );
    store.close().await
}

async fn index(config: Config) -> Result<()> {
    let service = build_service(&config).await?;
    let built = service.build_index().await?;
    if built {
        println!("Vector index built");
    } else {
        println!("Not enough memories to build a vector index yet");
    }
    service.shutdown().await
}

async fn stats(config: Config, json: bool) -> Result<()> {
    let service = build_service(&config).await?;
    let stats = service.stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Store:       {}", stats.store);
        println!("Dimensions:  {}", stats.embedding_dimensions);
        println!("Total:       {}", stats.total_memories);
        for (category, count) in &stats.by_category {
            println!("  {category:<10} {count}");
        }
    }

    service.shutdown().await
}

async fn purge(config: Config, older_than_days: u32) -> Result<()> {
    let service = build_service(&config).await?;
    let removed = service.purge_older_than(older_than_days).await?;
    println!("Removed {removed} memories older than {older_than_days} days");
    service.shutdown().await
}
