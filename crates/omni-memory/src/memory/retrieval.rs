//! Memory read path
//!
//! Embeds a query, ranks filtered candidates by cosine similarity, drops
//! everything below the threshold and truncates to the limit. How ranking
//! happens is decided by [`RankingStrategy`]:
//!
//! - `Store`: the store ranks with its native cosine-distance operator and
//!   returns at most `limit` rows.
//! - `Scan`: the newest `scan_window` matching records are pulled into
//!   memory and ranked here. Records outside the window are never
//!   considered.

use std::sync::Arc;

use crate::config::{RankingStrategy, RecallConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::memory::ingestion::normalize_context_id;
use crate::memory::similarity;
use crate::memory::types::ScoredMemory;
use crate::storage::{MemoryFilter, RecordStore};

/// Input to the read path
#[derive(Debug, Clone, Default)]
pub struct RecallRequest {
    pub query: String,
    pub filter: MemoryFilter,
    /// Defaults to `RecallConfig::default_limit`
    pub limit: Option<usize>,
    /// Defaults to `RecallConfig::min_similarity`
    pub min_similarity: Option<f32>,
}

impl RecallRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: MemoryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }
}

/// Ranked results plus how much work produced them
#[derive(Debug, Clone)]
pub struct RecallOutcome {
    /// Best matches first, all at or above the threshold
    pub results: Vec<ScoredMemory>,
    /// Candidates the ranking looked at
    pub scanned: usize,
    /// Length of the query embedding
    pub query_dimensions: usize,
}

/// Pipeline answering recall queries
pub struct RetrievalPipeline {
    store: Arc<dyn RecordStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    config: RecallConfig,
}

impl RetrievalPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        config: RecallConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            config,
        }
    }

    pub fn config(&self) -> &RecallConfig {
        &self.config
    }

    /// Retrieve the best matching memories for a query
    pub async fn recall(&self, request: RecallRequest) -> Result<RecallOutcome> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(MemoryError::Validation("query must not be empty".to_string()));
        }

        let limit = request.limit.unwrap_or(self.config.default_limit);
        if limit == 0 || limit > self.config.max_limit {
            return Err(MemoryError::Validation(format!(
                "limit must be between 1 and {}, got {limit}",
                self.config.max_limit
            )));
        }

        let min_similarity = request.min_similarity.unwrap_or(self.config.min_similarity);
        if !(0.0..=1.0).contains(&min_similarity) {
            return Err(MemoryError::Validation(format!(
                "minSimilarity must be between 0 and 1, got {min_similarity}"
            )));
        }

        let mut filter = request.filter;
        filter.owner_agent = normalize_context_id("ownerAgent", filter.owner_agent)?;
        filter.conversation_thread =
            normalize_context_id("conversationThread", filter.conversation_thread)?;

        let query_embedding = self.embeddings.embed(query).await?;

        let (results, scanned) = match self.config.strategy {
            RankingStrategy::Store => {
                let mut ranked = self.store.nearest(&query_embedding, &filter, limit).await?;
                let scanned = ranked.len();
                ranked.retain(|s| s.similarity >= min_similarity);
                ranked.truncate(limit);
                (ranked, scanned)
            }
            RankingStrategy::Scan => {
                let candidates = self.store.recent(&filter, self.config.scan_window).await?;
                let scanned = candidates.len();
                let ranked = similarity::rank(&query_embedding, candidates, min_similarity, limit)?;
                (ranked, scanned)
            }
        };

        tracing::debug!(
            strategy = ?self.config.strategy,
            scanned,
            returned = results.len(),
            min_similarity,
            "Recall complete"
        );

        Ok(RecallOutcome {
            results,
            scanned,
            query_dimensions: query_embedding.len(),
        })
    }
}
