//! Filter types for memory queries
//!
//! Exact-match filters narrowing the candidate set before ranking. Every
//! field is optional; set fields are combined with AND.

use chrono::{DateTime, Utc};

use crate::memory::types::{Category, Priority};

/// Exact-match filter criteria.
///
/// When a field is `None` that filter is not applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryFilter {
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub owner_agent: Option<String>,
    pub conversation_thread: Option<String>,
    /// Only records created strictly before this instant
    pub created_before: Option<DateTime<Utc>>,
}

impl MemoryFilter {
    /// Create a new empty filter (no filtering applied)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
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

    pub fn created_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_before = Some(cutoff);
        self
    }

    /// Build a SQL WHERE clause for LanceDB from this filter.
    /// Returns `None` if no filters are set.
    pub fn to_sql_clause(&self) -> Option<String> {
        let mut conditions = Vec::new();

        if let Some(category) = self.category {
            conditions.push(format!("category = '{}'", category.as_str()));
        }

        if let Some(priority) = self.priority {
            conditions.push(format!("priority = '{}'", priority.as_str()));
        }

        if let Some(ref owner) = self.owner_agent {
            conditions.push(format!("owner_agent = '{}'", escape_literal(owner)));
        }

        if let Some(ref thread) = self.conversation_thread {
            conditions.push(format!("conversation_thread = '{}'", escape_literal(thread)));
        }

        if let Some(ref cutoff) = self.created_before {
            conditions.push(format!(
                "created_at < timestamp '{}'",
                cutoff.format("%Y-%m-%d %H:%M:%S%.6f")
            ));
        }

        if conditions.is_empty() {
            None
        } else {
            Some(conditions.join(" AND "))
        }
    }

    /// Check if this filter is empty (no conditions set)
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.priority.is_none()
            && self.owner_agent.is_none()
            && self.conversation_thread.is_none()
            && self.created_before.is_none()
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
