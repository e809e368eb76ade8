//! Direct structured store, consulted when the backend comes up short

pub mod filter;
pub mod lance;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::error::Result;
use crate::memory::extract::truncate_chars;

pub use filter::TextFilter;
pub use lance::LanceStore;

/// The two record sets held by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemorySet {
    ShortTerm,
    LongTerm,
}

impl MemorySet {
    pub const ALL: [MemorySet; 2] = [MemorySet::ShortTerm, MemorySet::LongTerm];

    pub fn table_name(&self) -> &'static str {
        match self {
            MemorySet::ShortTerm => "short_term_memory",
            MemorySet::LongTerm => "long_term_memory",
        }
    }
}

impl fmt::Display for MemorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// A row of the direct store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMemory {
    pub id: String,
    pub set: MemorySet,
    pub user_id: String,
    pub searchable_content: Option<String>,
    pub summary: Option<String>,
    /// Serialized JSON document
    pub processed_data: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredMemory {
    pub fn new(set: MemorySet, user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            set,
            user_id: user_id.into(),
            searchable_content: None,
            summary: None,
            processed_data: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_searchable_content(mut self, text: impl Into<String>) -> Self {
        self.searchable_content = Some(text.into());
        self
    }

    pub fn with_summary(mut self, text: impl Into<String>) -> Self {
        self.summary = Some(text.into());
        self
    }

    pub fn with_processed_data(mut self, data: &Value) -> Self {
        self.processed_data = Some(data.to_string());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Text shown for this row: `processed_data.content`, then
    /// `searchable_content`, then `summary`, truncated to `max_chars`.
    pub fn display_text(&self, max_chars: usize) -> Option<String> {
        let from_processed = self
            .processed_data
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .and_then(|data| data.get("content").and_then(Value::as_str).map(str::to_string));

        [from_processed, self.searchable_content.clone(), self.summary.clone()]
            .into_iter()
            .flatten()
            .map(|text| text.trim().to_string())
            .find(|text| !text.is_empty())
            .map(|text| truncate_chars(&text, max_chars))
    }
}

/// Read-only substring search over the store
#[async_trait]
pub trait DirectSearch: Send + Sync {
    /// Rows of `user_id` whose text fields contain `query`, case-insensitively.
    ///
    /// At most `per_set_limit` rows come from each set; the merged result is
    /// ordered newest first.
    async fn search_text(
        &self,
        query: &str,
        user_id: &str,
        per_set_limit: usize,
    ) -> Result<Vec<StoredMemory>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_text_prefers_processed_content() {
        let memory = StoredMemory::new(MemorySet::LongTerm, "u")
            .with_searchable_content("searchable")
            .with_summary("summary")
            .with_processed_data(&json!({"content": "processed"}));
        assert_eq!(memory.display_text(200).as_deref(), Some("processed"));
    }

    #[test]
    fn test_display_text_falls_back_in_order() {
        let memory = StoredMemory::new(MemorySet::ShortTerm, "u")
            .with_summary("summary")
            .with_processed_data(&json!({"importance": 2}));
        assert_eq!(memory.display_text(200).as_deref(), Some("summary"));

        let memory = memory.with_searchable_content("  ");
        assert_eq!(memory.display_text(200).as_deref(), Some("summary"));

        let memory = StoredMemory::new(MemorySet::ShortTerm, "u");
        assert!(memory.display_text(200).is_none());
    }

    #[test]
    fn test_display_text_truncates() {
        let memory =
            StoredMemory::new(MemorySet::LongTerm, "u").with_searchable_content("x".repeat(300));
        let text = memory.display_text(200).unwrap();
        assert_eq!(text.chars().count(), 203);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_table_names() {
        assert_eq!(MemorySet::ShortTerm.table_name(), "short_term_memory");
        assert_eq!(MemorySet::LongTerm.to_string(), "long_term_memory");
    }
}
