//! Memory types for the Recollect pipeline
//!
//! Defines the value types that flow through retrieval, merging, narrative
//! composition and conversation commit. All of them are owned by the call
//! that produced them; none is shared across queries.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::MemoryConfig;

/// Retrieval strategy used when assembling context for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum MemoryMode {
    /// Session-scoped essential memories, not re-queried per message
    Conscious,
    /// Dynamic per-query retrieval
    #[default]
    Auto,
    /// Both strategies, merged
    Combined,
}

impl MemoryMode {
    /// Parse a mode name. Unrecognised names select conscious mode.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "auto" => MemoryMode::Auto,
            "combined" => MemoryMode::Combined,
            _ => MemoryMode::Conscious,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryMode::Conscious => "conscious",
            MemoryMode::Auto => "auto",
            MemoryMode::Combined => "combined",
        }
    }
}

impl From<String> for MemoryMode {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl fmt::Display for MemoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a memory item came from; drives merge priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTag {
    /// Backend-flagged essential or conscious memory
    Essential,
    /// Contextual retrieval hit
    Contextual,
    /// Line from recent conversation history
    Dialogue,
    /// Row found by the direct store fallback
    DirectStore,
    /// Conversational classification from the backend
    Conversational,
    /// Anything else
    Unknown,
}

impl SourceTag {
    /// Map a backend classification or memory-type label to a tag
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "essential" | "conscious_info" | "conscious" => SourceTag::Essential,
            "contextual" => SourceTag::Contextual,
            "dialogue" => SourceTag::Dialogue,
            "direct" | "direct_store" => SourceTag::DirectStore,
            "conversational" => SourceTag::Conversational,
            _ => SourceTag::Unknown,
        }
    }

    /// Label rendered in front of an item's content
    pub fn label(&self) -> &'static str {
        match self {
            SourceTag::Essential => "ESSENTIAL",
            SourceTag::Contextual => "CONTEXTUAL",
            SourceTag::Dialogue => "DIALOGUE",
            SourceTag::DirectStore => "DIRECT",
            SourceTag::Conversational => "CONVERSATIONAL",
            SourceTag::Unknown => "MEMORY",
        }
    }
}

/// A single normalized memory fragment headed for the merge stage.
///
/// `content` is trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryItem {
    pub content: String,
    pub tag: SourceTag,
    pub memory_id: Option<String>,
    pub memory_type: Option<String>,
}

impl MemoryItem {
    /// Build an item, or `None` when the content is blank
    pub fn new(content: impl AsRef<str>, tag: SourceTag) -> Option<Self> {
        let content = content.as_ref().trim();
        if content.is_empty() {
            return None;
        }
        Some(Self {
            content: content.to_string(),
            tag,
            memory_id: None,
            memory_type: None,
        })
    }

    pub fn with_memory_id(mut self, memory_id: Option<String>) -> Self {
        self.memory_id = memory_id.filter(|id| !id.is_empty());
        self
    }

    pub fn with_memory_type(mut self, memory_type: Option<String>) -> Self {
        self.memory_type = memory_type.filter(|t| !t.is_empty());
        self
    }

    /// Label rendered in front of the content
    pub fn label(&self) -> String {
        match (&self.tag, &self.memory_type) {
            (SourceTag::Unknown, Some(memory_type)) => memory_type.to_uppercase(),
            (tag, _) => tag.label().to_string(),
        }
    }
}

/// Record returned by the backend's read surfaces.
///
/// Every field is optional; which one holds the text depends on the surface
/// and on the backend version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMemoryRecord {
    #[serde(default)]
    pub memory_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub searchable_content: Option<String>,
    /// Nested object, or the same object JSON-encoded as a string
    #[serde(default)]
    pub processed_data: Option<Value>,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub memory_type: Option<String>,
    #[serde(default)]
    pub retrieval_method: Option<String>,
}

/// One exchange as reported by the backend's history surface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    #[serde(default)]
    pub user_input: String,
    #[serde(default)]
    pub ai_output: String,
    /// Unparseable timestamps become `None` rather than failing the listing
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Naive layouts tried after RFC 3339; read as UTC
const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse an RFC 3339 or SQLite-style timestamp
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(parse_timestamp))
}

/// A user/assistant exchange to be written to the backend exactly once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_input: String,
    pub ai_output: String,
    pub model: String,
}

impl ConversationTurn {
    pub fn new(
        user_input: impl Into<String>,
        ai_output: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            user_input: user_input.into(),
            ai_output: ai_output.into(),
            model: model.into(),
        }
    }

    /// True when a history entry holds exactly this exchange
    pub fn matches(&self, turn: &HistoryTurn) -> bool {
        turn.user_input == self.user_input && turn.ai_output == self.ai_output
    }
}

/// Opaque identifier the backend assigns to a recorded turn
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of committing a conversation turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub chat_id: ChatId,
    /// Whether the turn was observed in history within the poll budget
    pub confirmed: bool,
    /// Time spent settling and polling
    pub waited: Duration,
}

/// Per-call context: who is asking and how memories are retrieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySession {
    pub mode: MemoryMode,
    pub user_id: String,
    pub assistant_id: Option<String>,
    pub session_id: Option<String>,
}

impl MemorySession {
    pub fn new(mode: MemoryMode, user_id: impl Into<String>) -> Self {
        Self {
            mode,
            user_id: user_id.into(),
            assistant_id: None,
            session_id: None,
        }
    }
}

impl From<&MemoryConfig> for MemorySession {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            mode: config.mode,
            user_id: config.user_id.clone(),
            assistant_id: config.assistant_id.clone(),
            session_id: config.session_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_accepts_sqlite_timestamps() {
        let raw = r#"[
            {"user_input": "hi", "ai_output": "hello", "created_at": "2025-01-01 10:00:00.123456"},
            {"user_input": "again", "ai_output": "yes", "created_at": "2025-01-02T08:30:00Z"},
            {"user_input": "odd", "ai_output": "row", "created_at": "yesterday-ish"},
            {"user_input": "num", "ai_output": "row", "created_at": 1735725600}
        ]"#;

        let turns: Vec<HistoryTurn> = serde_json::from_str(raw).unwrap();
        assert_eq!(turns.len(), 4);

        let first = turns[0].created_at.unwrap();
        assert_eq!(first.to_rfc3339(), "2025-01-01T10:00:00.123456+00:00");
        assert_eq!(
            turns[1].created_at.unwrap().to_rfc3339(),
            "2025-01-02T08:30:00+00:00"
        );
        assert_eq!(turns[2].created_at, None);
        assert_eq!(turns[3].created_at, None);
    }

    #[test]
    fn test_history_without_timestamp() {
        let turn: HistoryTurn =
            serde_json::from_str(r#"{"user_input": "hi", "ai_output": "hello"}"#).unwrap();
        assert_eq!(turn.created_at, None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn test_memory_mode_parse() {
        assert_eq!(MemoryMode::parse("auto"), MemoryMode::Auto);
        assert_eq!(MemoryMode::parse(" Combined "), MemoryMode::Combined);
        assert_eq!(MemoryMode::parse("conscious"), MemoryMode::Conscious);
        assert_eq!(MemoryMode::parse(""), MemoryMode::Conscious);
        assert_eq!(MemoryMode::parse("bogus"), MemoryMode::Conscious);
    }

    #[test]
    fn test_memory_mode_serializes_lowercase() {
        let json = serde_json::to_string(&MemoryMode::Combined).unwrap();
        assert_eq!(json, "\"combined\"");
        let mode: MemoryMode = serde_json::from_str("\"AUTO\"").unwrap();
        assert_eq!(mode, MemoryMode::Auto);
    }

    #[test]
    fn test_source_tag_from_label() {
        assert_eq!(SourceTag::from_label("essential"), SourceTag::Essential);
        assert_eq!(SourceTag::from_label("CONSCIOUS_INFO"), SourceTag::Essential);
        assert_eq!(SourceTag::from_label("contextual"), SourceTag::Contextual);
        assert_eq!(
            SourceTag::from_label("conversational"),
            SourceTag::Conversational
        );
        assert_eq!(SourceTag::from_label("long_term"), SourceTag::Unknown);
        assert_eq!(SourceTag::from_label(""), SourceTag::Unknown);
    }

    #[test]
    fn test_memory_item_rejects_blank_content() {
        assert!(MemoryItem::new("", SourceTag::Essential).is_none());
        assert!(MemoryItem::new("  \n\t ", SourceTag::Essential).is_none());

        let item = MemoryItem::new("  likes tea  ", SourceTag::Dialogue).unwrap();
        assert_eq!(item.content, "likes tea");
    }

    #[test]
    fn test_memory_item_label() {
        let item = MemoryItem::new("x", SourceTag::Unknown)
            .unwrap()
            .with_memory_type(Some("long_term".to_string()));
        assert_eq!(item.label(), "LONG_TERM");

        let item = MemoryItem::new("x", SourceTag::Essential)
            .unwrap()
            .with_memory_type(Some("long_term".to_string()));
        assert_eq!(item.label(), "ESSENTIAL");

        let item = MemoryItem::new("x", SourceTag::Unknown).unwrap();
        assert_eq!(item.label(), "MEMORY");
    }

    #[test]
    fn test_raw_record_ignores_unknown_fields() {
        let record: RawMemoryRecord = serde_json::from_str(
            r#"{"summary": "likes tea", "importance": 0.9, "processed_data": {"content": "x"}}"#,
        )
        .unwrap();
        assert_eq!(record.summary.as_deref(), Some("likes tea"));
        assert!(record.content.is_none());
        assert!(record.processed_data.is_some());
    }

    #[test]
    fn test_turn_matches_exactly() {
        let turn = ConversationTurn::new("hi", "hello", "model-a");
        let same = HistoryTurn {
            user_input: "hi".to_string(),
            ai_output: "hello".to_string(),
            created_at: None,
        };
        let different = HistoryTurn {
            user_input: "hi".to_string(),
            ai_output: "hello!".to_string(),
            created_at: None,
        };
        assert!(turn.matches(&same));
        assert!(!turn.matches(&different));
    }

    #[test]
    fn test_chat_id_short() {
        assert_eq!(ChatId::new("0123456789abcdef").short(), "01234567");
        assert_eq!(ChatId::new("abc").short(), "abc");
    }

    #[test]
    fn test_session_from_config() {
        let config = MemoryConfig {
            mode: MemoryMode::Combined,
            user_id: "alice".to_string(),
            assistant_id: Some("helper".to_string()),
            session_id: None,
        };
        let session = MemorySession::from(&config);
        assert_eq!(session.mode, MemoryMode::Combined);
        assert_eq!(session.user_id, "alice");
        assert_eq!(session.assistant_id.as_deref(), Some("helper"));
    }
}
