//! Record stores
//!
//! A record store persists [`MemoryRecord`]s and answers two kinds of
//! queries for the read path: a store-ranked nearest-neighbour query using
//! its native cosine-distance operator, and a newest-first window of
//! candidates for in-process ranking.

pub mod filter;
pub mod lance;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, StorageBackend};
use crate::error::{MemoryError, Result};
use crate::memory::types::{MemoryRecord, NewMemory, ScoredMemory};

pub use filter::MemoryFilter;
pub use lance::LanceStore;
pub use postgres::PgVectorStore;

/// Name of the single memory table/collection
pub const MEMORIES_TABLE: &str = "semantic_memories";

/// Persistent storage for embedded memory records.
///
/// Records are append-only from the tool boundary. Implementations assign
/// ids and timestamps, and reject embeddings whose length differs from
/// [`RecordStore::dimension`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Embedding dimension every record in this store has
    fn dimension(&self) -> usize;

    /// Insert one record atomically and return it with id and timestamps
    async fn insert(&self, memory: NewMemory) -> Result<MemoryRecord>;

    /// Fetch a record by id
    async fn get(&self, id: i64) -> Result<Option<MemoryRecord>>;

    /// Top `limit` records matching `filter`, ranked inside the store by
    /// cosine distance. Similarity is `1 - distance`. No threshold applied.
    async fn nearest(
        &self,
        query: &[f32],
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<ScoredMemory>>;

    /// Up to `window` records matching `filter`, newest first
    async fn recent(&self, filter: &MemoryFilter, window: usize) -> Result<Vec<MemoryRecord>>;

    /// Number of records matching `filter`
    async fn count(&self, filter: &MemoryFilter) -> Result<usize>;

    /// Delete records matching `filter`, returning how many were removed.
    /// Only reachable through the operator purge, never through a tool.
    async fn delete_matching(&self, filter: &MemoryFilter) -> Result<usize>;

    /// Build or rebuild the cosine vector index. Returns false when the
    /// store decided not to build one (e.g. too few rows).
    async fn build_vector_index(&self) -> Result<bool>;

    /// Release connections. The store is unusable afterwards.
    async fn close(&self) -> Result<()>;
}

/// Open the configured store, creating the schema if needed
pub async fn open_store(config: &Config) -> Result<Arc<dyn RecordStore>> {
    let dimension = config.embedding.dimension;
    match config.storage.backend {
        StorageBackend::Lance => {
            let data_dir = &config.storage.data_dir;
            std::fs::create_dir_all(data_dir).map_err(|e| {
                MemoryError::Store(format!(
                    "Failed to create data directory {}: {}",
                    data_dir.display(),
                    e
                ))
            })?;
            let store = LanceStore::open(data_dir, dimension).await?;
            Ok(Arc::new(store))
        }
        StorageBackend::Postgres => {
            let url_env = &config.storage.database_url_env;
            let url = std::env::var(url_env).map_err(|_| {
                MemoryError::Config(format!("Database URL env var '{url_env}' not set"))
            })?;
            let store = PgVectorStore::connect(&url, dimension, &config.storage).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Reject an embedding whose length differs from the store dimension
pub(crate) fn ensure_dimension(expected: usize, embedding: &[f32]) -> Result<()> {
    if embedding.len() != expected {
        return Err(MemoryError::Validation(format!(
            "embedding has {} dimensions, store expects {}",
            embedding.len(),
            expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_dimension() {
        assert!(ensure_dimension(3, &[0.1, 0.2, 0.3]).is_ok());

        let err = ensure_dimension(3, &[0.1, 0.2]).unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
        assert!(err.to_string().contains("2 dimensions"));
    }

    #[tokio::test]
    async fn test_open_store_postgres_requires_url_env() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Postgres;
        config.storage.database_url_env = "OMNI_MEMORY_TEST_UNSET_DB_URL".to_string();
        unsafe { std::env::remove_var("OMNI_MEMORY_TEST_UNSET_DB_URL") };

        let err = open_store(&config).await.err().unwrap();
        assert!(matches!(err, MemoryError::Config(_)));
        assert!(err.to_string().contains("OMNI_MEMORY_TEST_UNSET_DB_URL"));
    }

    #[tokio::test]
    async fn test_open_store_lance_creates_data_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = temp_dir.path().join("nested").join("memory");
        config.embedding.dimension = 8;

        let store = open_store(&config).await.unwrap();

        assert_eq!(store.name(), "lancedb");
        assert_eq!(store.dimension(), 8);
        assert!(config.storage.data_dir.exists());
    }
}
