//! Tool boundary
//!
//! Exposes the write and read paths as two named tools for an LLM
//! tool-calling loop. Every call returns an envelope; errors are logged
//! and folded into `{success: false, message}` so the caller's loop keeps
//! running after a failed call.

pub mod args;
pub mod envelope;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::memory::{Category, MemoryService, Priority};

pub use args::{RecallArgs, StoreArgs};
pub use envelope::{RecallResponse, RecallResult, StoreResponse};

pub const STORE_TOOL: &str = "semantic-storage";
pub const RECALL_TOOL: &str = "semantic-recall";

/// JSON-schema descriptor handed to an LLM
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

pub struct MemoryTools {
    service: Arc<MemoryService>,
}

impl MemoryTools {
    pub fn new(service: Arc<MemoryService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<MemoryService> {
        &self.service
    }

    pub async fn store(&self, args: Value) -> StoreResponse {
        let request = match StoreArgs::from_value(args).and_then(StoreArgs::into_request) {
            Ok(request) => request,
            Err(e) => {
                warn!(tool = STORE_TOOL, error = %e, "Rejected store arguments");
                return StoreResponse::failed(e);
            }
        };

        match self.service.store(request).await {
            Ok(stored) => StoreResponse::stored(&stored),
            Err(e) => {
                warn!(tool = STORE_TOOL, kind = e.kind(), error = %e, "Store failed");
                StoreResponse::failed(e)
            }
        }
    }

    pub async fn recall(&self, args: Value) -> RecallResponse {
        // Echo the query back even when the rest of the arguments are bad
        let raw_query = args
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let request = match RecallArgs::from_value(args).and_then(RecallArgs::into_request) {
            Ok(request) => request,
            Err(e) => {
                warn!(tool = RECALL_TOOL, error = %e, "Rejected recall arguments");
                return RecallResponse::failed(raw_query, e);
            }
        };

        let query = request.query.clone();
        match self.service.recall(request).await {
            Ok(outcome) => RecallResponse::found(query, outcome),
            Err(e) => {
                warn!(tool = RECALL_TOOL, kind = e.kind(), error = %e, "Recall failed");
                RecallResponse::failed(query, e)
            }
        }
    }

    /// Dispatch by tool name and return the envelope as JSON
    pub async fn call(&self, name: &str, args: Value) -> Value {
        let envelope = match name {
            STORE_TOOL => serde_json::to_value(self.store(args).await),
            RECALL_TOOL => serde_json::to_value(self.recall(args).await),
            other => {
                warn!(tool = other, "Unknown tool");
                return json!({"success": false, "message": format!("Unknown tool: {other}")});
            }
        };

        envelope.unwrap_or_else(|e| {
            json!({"success": false, "message": format!("Failed to encode response: {e}")})
        })
    }

    /// Descriptors for both tools, limits taken from the recall config
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let recall = self.service.recall_config();
        let categories: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
        let priorities: Vec<&str> = Priority::ALL.iter().map(Priority::as_str).collect();
        let mut category_filters = categories.clone();
        category_filters.push(args::ALL_FILTER);
        let mut priority_filters = priorities.clone();
        priority_filters.push(args::ALL_FILTER);

        vec![
            ToolDefinition {
                name: STORE_TOOL,
                description: "Store information as a semantic memory so it can be recalled later by meaning.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "content": {"type": "string", "description": "Text to remember"},
                        "category": {"type": "string", "enum": categories, "default": "general"},
                        "priority": {"type": "string", "enum": priorities, "default": "medium"},
                        "tags": {"type": "array", "items": {"type": "string"}},
                        "metadata": {"type": "object"},
                        "ownerAgent": {"type": "string", "maxLength": 255},
                        "conversationThread": {"type": "string", "maxLength": 255}
                    },
                    "required": ["content"],
                    "additionalProperties": false
                }),
            },
            ToolDefinition {
                name: RECALL_TOOL,
                description: "Find stored memories whose meaning is similar to a query.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "What to look for"},
                        "category": {"type": "string", "enum": category_filters, "default": "all"},
                        "priority": {"type": "string", "enum": priority_filters, "default": "all"},
                        "ownerAgent": {"type": "string", "maxLength": 255},
                        "conversationThread": {"type": "string", "maxLength": 255},
                        "limit": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": recall.max_limit,
                            "default": recall.default_limit
                        },
                        "minSimilarity": {
                            "type": "number",
                            "minimum": 0,
                            "maximum": 1,
                            "default": recall.min_similarity
                        }
                    },
                    "required": ["query"],
                    "additionalProperties": false
                }),
            },
        ]
    }
}
