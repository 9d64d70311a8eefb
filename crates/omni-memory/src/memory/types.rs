//! Memory types for omni-memory
//!
//! Defines the persisted record, the insert payload, and the closed
//! category/priority enumerations every record carries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MemoryError;

/// A persisted, embedded unit of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Store-assigned, monotonically increasing identifier
    pub id: i64,
    /// The original text
    pub content: String,
    /// Embedding vector, same length for every record in a collection
    pub embedding: Vec<f32>,
    /// Open key-value bag for provenance and structured context
    pub metadata: Map<String, Value>,
    pub category: Category,
    pub priority: Priority,
    pub tags: Vec<String>,
    /// Which logical agent wrote the record
    pub owner_agent: Option<String>,
    /// Originating conversation
    pub conversation_thread: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload: a record before the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Map<String, Value>,
    pub category: Category,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub owner_agent: Option<String>,
    pub conversation_thread: Option<String>,
}

impl NewMemory {
    /// Create a payload with default category, priority and empty context
    pub fn new(content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            content: content.into(),
            embedding,
            metadata: Map::new(),
            category: Category::default(),
            priority: Priority::default(),
            tags: Vec::new(),
            owner_agent: None,
            conversation_thread: None,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_owner_agent(mut self, owner_agent: impl Into<String>) -> Self {
        self.owner_agent = Some(owner_agent.into());
        self
    }

    pub fn with_conversation_thread(mut self, thread: impl Into<String>) -> Self {
        self.conversation_thread = Some(thread.into());
        self
    }
}

/// A record paired with its cosine similarity to a query
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub record: MemoryRecord,
    /// Cosine similarity in [-1, 1], unrounded
    pub similarity: f32,
}

/// Classification label, drawn from a closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Research,
    Email,
    Coding,
    Personal,
    #[default]
    General,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Research,
        Category::Email,
        Category::Coding,
        Category::Personal,
        Category::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Research => "research",
            Category::Email => "email",
            Category::Coding => "coding",
            Category::Personal => "personal",
            Category::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "research" => Ok(Category::Research),
            "email" => Ok(Category::Email),
            "coding" => Ok(Category::Coding),
            "personal" => Ok(Category::Personal),
            "general" => Ok(Category::General),
            other => Err(MemoryError::Validation(format!(
                "unknown category '{other}', expected one of research, email, coding, personal, general"
            ))),
        }
    }
}

/// Urgency label, drawn from a closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(MemoryError::Validation(format!(
                "unknown priority '{other}', expected one of low, medium, high, critical"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_memory_defaults() {
        let memory = NewMemory::new("Remember this", vec![0.1, 0.2]);
        assert_eq!(memory.category, Category::General);
        assert_eq!(memory.priority, Priority::Medium);
        assert!(memory.tags.is_empty());
        assert!(memory.metadata.is_empty());
        assert!(memory.owner_agent.is_none());
        assert!(memory.conversation_thread.is_none());
    }

    #[test]
    fn test_builder_sets_context() {
        let memory = NewMemory::new("Quarterly report due", vec![1.0])
            .with_category(Category::Email)
            .with_priority(Priority::Critical)
            .with_tags(vec!["finance".to_string()])
            .with_owner_agent("email-agent")
            .with_conversation_thread("thread-42");

        assert_eq!(memory.category, Category::Email);
        assert_eq!(memory.priority, Priority::Critical);
        assert_eq!(memory.tags, vec!["finance".to_string()]);
        assert_eq!(memory.owner_agent.as_deref(), Some("email-agent"));
        assert_eq!(memory.conversation_thread.as_deref(), Some("thread-42"));
    }

    #[test]
    fn test_category_parse_roundtrip() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn test_unknown_category_rejected() {
        let err = "work".parse::<Category>().unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
        assert!(err.to_string().contains("work"));
    }

    #[test]
    fn test_enum_parsing_is_case_sensitive() {
        assert!("Coding".parse::<Category>().is_err());
        assert!("HIGH".parse::<Priority>().is_err());
    }

    #[test]
    fn test_unknown_priority_rejected() {
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
    }

    #[test]
    fn test_enum_serialization() {
        assert_eq!(serde_json::to_string(&Category::Coding).unwrap(), "\"coding\"");
        assert_eq!(serde_json::to_string(&Priority::Critical).unwrap(), "\"critical\"");

        let parsed: Category = serde_json::from_str("\"personal\"").unwrap();
        assert_eq!(parsed, Category::Personal);
        assert!(serde_json::from_str::<Priority>("\"urgent\"").is_err());
    }
}
