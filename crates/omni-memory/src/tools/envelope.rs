//! Tool responses
//!
//! Every tool call answers with an envelope carrying `success` and a
//! human-readable `message`, whether it worked or not.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::memory::similarity::round_similarity;
use crate::memory::{RecallOutcome, ScoredMemory, StoredMemory};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_dimensions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl StoreResponse {
    pub fn stored(stored: &StoredMemory) -> Self {
        Self {
            success: true,
            id: Some(stored.id),
            message: format!("Semantic memory stored successfully with ID {}", stored.id),
            embedding_dimensions: Some(stored.embedding_dimensions),
            category: Some(stored.category.to_string()),
            created_at: Some(stored.created_at.to_rfc3339()),
        }
    }

    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            id: None,
            message: format!("Failed to store memory: {reason}"),
            embedding_dimensions: None,
            category: None,
            created_at: None,
        }
    }
}

/// One recalled memory, embedding omitted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResult {
    pub id: i64,
    pub content: String,
    pub category: String,
    pub priority: String,
    pub tags: Vec<String>,
    pub owner_agent: Option<String>,
    pub conversation_thread: Option<String>,
    /// Rounded to three decimals
    pub similarity: f64,
    pub metadata: Map<String, Value>,
    /// RFC 3339
    pub created_at: String,
}

impl From<ScoredMemory> for RecallResult {
    fn from(scored: ScoredMemory) -> Self {
        let record = scored.record;
        Self {
            id: record.id,
            content: record.content,
            category: record.category.to_string(),
            priority: record.priority.to_string(),
            tags: record.tags,
            owner_agent: record.owner_agent,
            conversation_thread: record.conversation_thread,
            similarity: round_similarity(scored.similarity),
            metadata: record.metadata,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResponse {
    pub success: bool,
    pub query: String,
    pub results: Vec<RecallResult>,
    pub total_found: usize,
    pub total_scanned: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_dimensions: Option<usize>,
    pub message: String,
}

impl RecallResponse {
    pub fn found(query: String, outcome: RecallOutcome) -> Self {
        let results: Vec<RecallResult> = outcome.results.into_iter().map(Into::into).collect();
        let message = if results.is_empty() {
            "No memories found matching the query and filters".to_string()
        } else {
            format!("Found {} relevant memories", results.len())
        };

        Self {
            success: true,
            query,
            total_found: results.len(),
            results,
            total_scanned: outcome.scanned,
            query_dimensions: Some(outcome.query_dimensions),
            message,
        }
    }

    pub fn failed(query: String, reason: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            query,
            results: Vec::new(),
            total_found: 0,
            total_scanned: 0,
            query_dimensions: None,
            message: format!("Search failed: {reason}"),
        }
    }
}
