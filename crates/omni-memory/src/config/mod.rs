use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{MemoryError, Result};

/// Main configuration structure for omni-memory
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Record store configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Recall defaults and ranking strategy
    #[serde(default)]
    pub recall: RecallConfig,
    /// HTTP tool server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Parse a TOML document, applying defaults for anything missing
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| MemoryError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the read or write path misbehave
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(MemoryError::Config(
                "embedding.dimension must be greater than zero".to_string(),
            ));
        }
        if self.recall.max_limit == 0 {
            return Err(MemoryError::Config(
                "recall.max_limit must be greater than zero".to_string(),
            ));
        }
        if self.recall.default_limit == 0 || self.recall.default_limit > self.recall.max_limit {
            return Err(MemoryError::Config(format!(
                "recall.default_limit must be between 1 and {}, got {}",
                self.recall.max_limit, self.recall.default_limit
            )));
        }
        if !(0.0..=1.0).contains(&self.recall.min_similarity) {
            return Err(MemoryError::Config(format!(
                "recall.min_similarity must be between 0 and 1, got {}",
                self.recall.min_similarity
            )));
        }
        if self.recall.scan_window == 0 {
            return Err(MemoryError::Config(
                "recall.scan_window must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which record store backs the memory table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Embedded LanceDB under `data_dir`
    #[default]
    Lance,
    /// Postgres with the pgvector extension
    Postgres,
}

/// Record store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Store implementation
    #[serde(default)]
    pub backend: StorageBackend,
    /// Base directory for LanceDB data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Environment variable holding the Postgres connection string
    #[serde(default = "default_database_url_env")]
    pub database_url_env: String,
    /// Postgres pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: default_data_dir(),
            database_url_env: default_database_url_env(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".omni-memory"))
        .unwrap_or_else(|| PathBuf::from(".omni-memory"))
}

fn default_database_url_env() -> String {
    "DATABASE_URL".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    10
}

/// Which embedding provider produces vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// OpenAI-compatible `/embeddings` endpoint
    #[default]
    OpenAi,
    /// Local ONNX model through fastembed
    Local,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider implementation
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    /// Model name or identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Embedding dimension; every stored vector must have exactly this length
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable name for the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> usize {
    1536
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

/// How the read path ranks candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RankingStrategy {
    /// Let the store rank with its native cosine-distance operator
    #[default]
    Store,
    /// Pull the most recent `scan_window` candidates and rank in-process
    Scan,
}

/// Recall defaults shared by every call site
#[derive(Debug, Clone, Deserialize)]
pub struct RecallConfig {
    /// Ranking strategy used by the read path
    #[serde(default)]
    pub strategy: RankingStrategy,
    /// Results returned when the caller gives no limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Largest limit a caller may ask for
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Similarity threshold applied when the caller gives none
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    /// Candidates pulled into memory per scan-ranked recall. Bounds memory
    /// and CPU per request and caps recall on very large collections.
    #[serde(default = "default_scan_window")]
    pub scan_window: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            strategy: RankingStrategy::default(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            min_similarity: default_min_similarity(),
            scan_window: default_scan_window(),
        }
    }
}

fn default_limit() -> usize {
    5
}

fn default_max_limit() -> usize {
    20
}

fn default_min_similarity() -> f32 {
    0.5
}

fn default_scan_window() -> usize {
    1000
}

/// HTTP tool server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:4111")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:4111".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StorageBackend::Lance);
        assert_eq!(config.storage.database_url_env, "DATABASE_URL");
        assert_eq!(config.storage.max_connections, 5);
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::OpenAi);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.embedding.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.recall.strategy, RankingStrategy::Store);
        assert_eq!(config.recall.default_limit, 5);
        assert_eq!(config.recall.max_limit, 20);
        assert_eq!(config.recall.min_similarity, 0.5);
        assert_eq!(config.recall.scan_window, 1000);
        assert_eq!(config.server.listen_addr, "127.0.0.1:4111");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[storage]
backend = "postgres"
data_dir = "/tmp/omni"
database_url_env = "MEMORY_DB_URL"
max_connections = 12

[embedding]
provider = "local"
model = "BGESmallENV15"
dimension = 384
timeout_secs = 5

[recall]
strategy = "scan"
default_limit = 3
max_limit = 10
min_similarity = 0.7
scan_window = 250

[server]
listen_addr = "0.0.0.0:8080"
"#;

        let config = Config::from_toml_str(toml_str).expect("Failed to parse TOML");

        assert_eq!(config.storage.backend, StorageBackend::Postgres);
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/omni"));
        assert_eq!(config.storage.database_url_env, "MEMORY_DB_URL");
        assert_eq!(config.storage.max_connections, 12);

        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Local);
        assert_eq!(config.embedding.model, "BGESmallENV15");
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.embedding.timeout_secs, 5);

        assert_eq!(config.recall.strategy, RankingStrategy::Scan);
        assert_eq!(config.recall.default_limit, 3);
        assert_eq!(config.recall.max_limit, 10);
        assert!((config.recall.min_similarity - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.recall.scan_window, 250);

        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let toml_str = r#"
[recall]
strategy = "scan"
"#;

        let config = Config::from_toml_str(toml_str).expect("Failed to parse partial TOML");

        assert_eq!(config.recall.strategy, RankingStrategy::Scan);
        assert_eq!(config.recall.default_limit, 5);
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.storage.backend, StorageBackend::Lance);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let toml_str = r#"
[recall]
strategy = "hybrid"
"#;

        let err = Config::from_toml_str(toml_str).unwrap_err();
        assert!(matches!(err, MemoryError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_default_limit_above_max() {
        let mut config = Config::default();
        config.recall.default_limit = 25;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_threshold_out_of_range() {
        let mut config = Config::default();
        config.recall.min_similarity = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_dimension_and_window() {
        let mut config = Config::default();
        config.embedding.dimension = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.recall.scan_window = 0;
        assert!(config.validate().is_err());
    }
}
