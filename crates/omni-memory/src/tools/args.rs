//! Tool arguments as they arrive on the wire
//!
//! Enum fields stay strings here so an out-of-set value becomes a
//! validation failure with a readable message instead of a serde error
//! naming internal variants.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{MemoryError, Result};
use crate::memory::{Category, Priority, RecallRequest, StoreRequest};
use crate::storage::MemoryFilter;

/// Wildcard accepted by recall for the enum filters
pub const ALL_FILTER: &str = "all";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StoreArgs {
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub owner_agent: Option<String>,
    #[serde(default)]
    pub conversation_thread: Option<String>,
}

impl StoreArgs {
    pub fn from_value(args: Value) -> Result<Self> {
        serde_json::from_value(args)
            .map_err(|e| MemoryError::Validation(format!("invalid arguments: {e}")))
    }

    pub fn into_request(self) -> Result<StoreRequest> {
        let category = self
            .category
            .as_deref()
            .map(str::parse::<Category>)
            .transpose()?;
        let priority = self
            .priority
            .as_deref()
            .map(str::parse::<Priority>)
            .transpose()?;

        Ok(StoreRequest {
            content: self.content,
            category,
            priority,
            tags: self.tags.unwrap_or_default(),
            metadata: self.metadata.unwrap_or_default(),
            owner_agent: self.owner_agent,
            conversation_thread: self.conversation_thread,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecallArgs {
    pub query: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub owner_agent: Option<String>,
    #[serde(default)]
    pub conversation_thread: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_similarity: Option<f32>,
}

impl RecallArgs {
    pub fn from_value(args: Value) -> Result<Self> {
        serde_json::from_value(args)
            .map_err(|e| MemoryError::Validation(format!("invalid arguments: {e}")))
    }

    pub fn into_request(self) -> Result<RecallRequest> {
        let filter = MemoryFilter {
            category: parse_enum_filter::<Category>(self.category.as_deref())?,
            priority: parse_enum_filter::<Priority>(self.priority.as_deref())?,
            owner_agent: self.owner_agent,
            conversation_thread: self.conversation_thread,
            created_before: None,
        };

        Ok(RecallRequest {
            query: self.query,
            filter,
            limit: self.limit,
            min_similarity: self.min_similarity,
        })
    }
}

/// `None` and `"all"` both mean "do not filter"
fn parse_enum_filter<T>(value: Option<&str>) -> Result<Option<T>>
where
    T: std::str::FromStr<Err = MemoryError>,
{
    match value {
        None => Ok(None),
        Some(v) if v.eq_ignore_ascii_case(ALL_FILTER) => Ok(None),
        Some(v) => v.parse().map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_store_args_defaults() {
        let request = StoreArgs::from_value(json!({"content": "hello"}))
            .unwrap()
            .into_request()
            .unwrap();

        assert_eq!(request.content, "hello");
        assert_eq!(request.category, None);
        assert!(request.tags.is_empty());
        assert!(request.metadata.is_empty());
    }

    #[test]
    fn test_store_args_full() {
        let request = StoreArgs::from_value(json!({
            "content": "hello",
            "category": "coding",
            "priority": "high",
            "tags": ["rust"],
            "metadata": {"source": "chat"},
            "ownerAgent": "coder",
            "conversationThread": "t-9"
        }))
        .unwrap()
        .into_request()
        .unwrap();

        assert_eq!(request.category, Some(Category::Coding));
        assert_eq!(request.priority, Some(Priority::High));
        assert_eq!(request.tags, vec!["rust".to_string()]);
        assert_eq!(request.metadata["source"], json!("chat"));
        assert_eq!(request.owner_agent.as_deref(), Some("coder"));
    }

    #[test]
    fn test_store_args_rejects_unknown_field() {
        let err = StoreArgs::from_value(json!({"content": "x", "colour": "red"})).unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[test]
    fn test_store_args_rejects_out_of_set_category() {
        let err = StoreArgs::from_value(json!({"content": "x", "category": "all"}))
            .unwrap()
            .into_request()
            .unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[test]
    fn test_recall_args_all_means_no_filter() {
        let request = RecallArgs::from_value(json!({
            "query": "q",
            "category": "all",
            "priority": "ALL"
        }))
        .unwrap()
        .into_request()
        .unwrap();

        assert!(request.filter.is_empty());
        assert_eq!(request.limit, None);
    }

    #[test]
    fn test_recall_args_wrong_type() {
        let err = RecallArgs::from_value(json!({"query": "q", "limit": "five"})).unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));

        let err = RecallArgs::from_value(json!({"query": "q", "limit": -1})).unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[test]
    fn test_recall_args_missing_query() {
        let err = RecallArgs::from_value(json!({"limit": 3})).unwrap_err();
        assert!(err.to_string().contains("query"));
    }
}
