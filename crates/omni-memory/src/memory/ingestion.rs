//! Memory write path
//!
//! Validates input, embeds the content and persists one record. Either the
//! record is stored with a valid embedding or nothing is written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::memory::types::{Category, NewMemory, Priority};
use crate::storage::{RecordStore, ensure_dimension};

/// Longest accepted owner agent / conversation thread identifier
pub const MAX_CONTEXT_ID_LENGTH: usize = 255;

/// Input to the write path
#[derive(Debug, Clone, Default)]
pub struct StoreRequest {
    pub content: String,
    /// Defaults to `general`
    pub category: Option<Category>,
    /// Defaults to `medium`
    pub priority: Option<Priority>,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
    pub owner_agent: Option<String>,
    pub conversation_thread: Option<String>,
}

impl StoreRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// What the write path reports back
#[derive(Debug, Clone)]
pub struct StoredMemory {
    pub id: i64,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    pub embedding_dimensions: usize,
}

/// Pipeline for storing content as embedded memory records
pub struct IngestionPipeline {
    store: Arc<dyn RecordStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn RecordStore>, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embeddings }
    }

    /// Embed and persist one memory.
    ///
    /// Validation happens before any I/O. Provider failures leave the store
    /// untouched; there are no retries.
    pub async fn store(&self, request: StoreRequest) -> Result<StoredMemory> {
        let content = request.content.trim();
        if content.is_empty() {
            return Err(MemoryError::Validation(
                "content must not be empty".to_string(),
            ));
        }
        let owner_agent = normalize_context_id("ownerAgent", request.owner_agent)?;
        let conversation_thread =
            normalize_context_id("conversationThread", request.conversation_thread)?;

        let embedding = self.embeddings.embed(content).await?;
        ensure_dimension(self.store.dimension(), &embedding)?;
        let embedding_dimensions = embedding.len();

        let mut memory = NewMemory::new(content, embedding)
            .with_category(request.category.unwrap_or_default())
            .with_priority(request.priority.unwrap_or_default())
            .with_tags(request.tags)
            .with_metadata(request.metadata);
        memory.owner_agent = owner_agent;
        memory.conversation_thread = conversation_thread;

        let record = self.store.insert(memory).await?;

        tracing::debug!(
            id = record.id,
            category = %record.category,
            store = self.store.name(),
            "Stored memory"
        );

        Ok(StoredMemory {
            id: record.id,
            category: record.category,
            created_at: record.created_at,
            embedding_dimensions,
        })
    }
}

/// Blank identifiers mean "not given"; overlong ones are rejected
pub(crate) fn normalize_context_id(field: &str, value: Option<String>) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_CONTEXT_ID_LENGTH {
        return Err(MemoryError::Validation(format!(
            "{field} must be at most {MAX_CONTEXT_ID_LENGTH} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}
