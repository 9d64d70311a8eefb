//! Memory service
//!
//! Owns the store and the embedding provider and wires the write path, the
//! read path and the operator maintenance tasks together. Constructed once
//! at startup and shared behind an `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::RecallConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::memory::ingestion::{IngestionPipeline, StoreRequest, StoredMemory};
use crate::memory::retrieval::{RecallOutcome, RecallRequest, RetrievalPipeline};
use crate::memory::types::Category;
use crate::storage::{MemoryFilter, RecordStore};

/// Record counts for operators
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_memories: usize,
    pub by_category: BTreeMap<String, usize>,
    pub store: String,
    pub embedding_dimensions: usize,
}

pub struct MemoryService {
    store: Arc<dyn RecordStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    ingestion: IngestionPipeline,
    retrieval: RetrievalPipeline,
}

impl MemoryService {
    /// Fails when the provider and the store disagree on dimension; every
    /// later write would be rejected otherwise.
    pub fn new(
        store: Arc<dyn RecordStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        recall: RecallConfig,
    ) -> Result<Self> {
        if embeddings.dimension() != store.dimension() {
            return Err(MemoryError::Config(format!(
                "Embedding provider '{}' produces {} dimensions but store '{}' expects {}",
                embeddings.name(),
                embeddings.dimension(),
                store.name(),
                store.dimension()
            )));
        }

        let ingestion = IngestionPipeline::new(Arc::clone(&store), Arc::clone(&embeddings));
        let retrieval = RetrievalPipeline::new(Arc::clone(&store), Arc::clone(&embeddings), recall);

        Ok(Self {
            store,
            embeddings,
            ingestion,
            retrieval,
        })
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.name()
    }

    pub fn embedding_provider(&self) -> &'static str {
        self.embeddings.name()
    }

    pub fn recall_config(&self) -> &RecallConfig {
        self.retrieval.config()
    }

    pub async fn store(&self, request: StoreRequest) -> Result<StoredMemory> {
        self.ingestion.store(request).await
    }

    pub async fn recall(&self, request: RecallRequest) -> Result<RecallOutcome> {
        self.retrieval.recall(request).await
    }

    pub async fn stats(&self) -> Result<MemoryStats> {
        let total_memories = self.store.count(&MemoryFilter::new()).await?;

        let mut by_category = BTreeMap::new();
        for category in Category::ALL {
            let count = self
                .store
                .count(&MemoryFilter::new().with_category(category))
                .await?;
            by_category.insert(category.to_string(), count);
        }

        Ok(MemoryStats {
            total_memories,
            by_category,
            store: self.store.name().to_string(),
            embedding_dimensions: self.store.dimension(),
        })
    }

    /// Delete every record older than `days` days
    pub async fn purge_older_than(&self, days: u32) -> Result<usize> {
        if days == 0 {
            return Err(MemoryError::Validation(
                "purge age must be at least 1 day".to_string(),
            ));
        }

        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let removed = self
            .store
            .delete_matching(&MemoryFilter::new().created_before(cutoff))
            .await?;

        info!(removed, days, "Purged old memories");
        Ok(removed)
    }

    pub async fn build_index(&self) -> Result<bool> {
        let built = self.store.build_vector_index().await?;
        if built {
            info!(store = self.store.name(), "Vector index built");
        } else {
            info!(store = self.store.name(), "Too few records, vector index skipped");
        }
        Ok(built)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.store.close().await
    }
}
