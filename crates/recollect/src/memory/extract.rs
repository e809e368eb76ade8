//! Content extraction from backend records
//!
//! Backend records carry their text in one of several fields depending on
//! which surface produced them. Extraction walks the fields in a fixed order
//! and stops at the first non-empty one.

use serde_json::Value;

use crate::memory::types::RawMemoryRecord;

/// Marker appended to truncated content
pub const ELLIPSIS: &str = "...";

/// Keys searched inside `processed_data`, in order
const PROCESSED_DATA_KEYS: [&str; 4] = ["content", "summary", "user_input", "ai_output"];

impl RawMemoryRecord {
    /// Extract the record's text.
    ///
    /// Order: `content`, `summary`, `searchable_content`, then
    /// `processed_data` (`content`, `summary`, `user_input`, `ai_output`),
    /// then `processed_data` itself stringified. Returns trimmed text, or
    /// `None` when every field is blank.
    pub fn extract_content(&self) -> Option<String> {
        [&self.content, &self.summary, &self.searchable_content]
            .into_iter()
            .find_map(|field| non_blank(field.as_deref()))
            .or_else(|| self.processed_data.as_ref().and_then(processed_data_text))
    }
}

fn processed_data_text(data: &Value) -> Option<String> {
    let decoded;
    let object = match data {
        Value::String(raw) => {
            decoded = serde_json::from_str::<Value>(raw).ok();
            decoded.as_ref().and_then(Value::as_object)
        }
        other => other.as_object(),
    };

    if let Some(object) = object {
        let nested = PROCESSED_DATA_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(value_text));
        if nested.is_some() {
            return nested;
        }
    }

    value_text(data)
}

/// Render a JSON value as display text; strings are taken verbatim
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => non_blank(Some(s)),
        other => non_blank(Some(&other.to_string())),
    }
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Truncate to `max_chars` characters, appending `...` when anything was cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{}", &text[..idx], ELLIPSIS),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> RawMemoryRecord {
        RawMemoryRecord::default()
    }

    #[test]
    fn test_content_field_wins() {
        let rec = RawMemoryRecord {
            content: Some("from content".to_string()),
            summary: Some("from summary".to_string()),
            ..record()
        };
        assert_eq!(rec.extract_content().as_deref(), Some("from content"));
    }

    #[test]
    fn test_blank_fields_are_skipped() {
        let rec = RawMemoryRecord {
            content: Some("   ".to_string()),
            summary: None,
            searchable_content: Some(" searchable ".to_string()),
            ..record()
        };
        assert_eq!(rec.extract_content().as_deref(), Some("searchable"));
    }

    #[test]
    fn test_processed_data_object() {
        let rec = RawMemoryRecord {
            processed_data: Some(json!({"summary": "", "user_input": "my dog is Rex"})),
            ..record()
        };
        assert_eq!(rec.extract_content().as_deref(), Some("my dog is Rex"));
    }

    #[test]
    fn test_processed_data_encoded_string() {
        let rec = RawMemoryRecord {
            processed_data: Some(Value::String(r#"{"content": "likes jazz"}"#.to_string())),
            ..record()
        };
        assert_eq!(rec.extract_content().as_deref(), Some("likes jazz"));
    }

    #[test]
    fn test_processed_data_stringified_fallback() {
        let rec = RawMemoryRecord {
            processed_data: Some(Value::String("plain note".to_string())),
            ..record()
        };
        assert_eq!(rec.extract_content().as_deref(), Some("plain note"));

        let rec = RawMemoryRecord {
            processed_data: Some(json!({"importance": 3})),
            ..record()
        };
        assert_eq!(rec.extract_content().as_deref(), Some(r#"{"importance":3}"#));
    }

    #[test]
    fn test_empty_record_has_no_content() {
        assert!(record().extract_content().is_none());
        let rec = RawMemoryRecord {
            processed_data: Some(Value::Null),
            ..record()
        };
        assert!(rec.extract_content().is_none());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 200), "short");

        let long = "a".repeat(250);
        let truncated = truncate_chars(&long, 200);
        assert_eq!(truncated.chars().count(), 203);
        assert!(truncated.ends_with(ELLIPSIS));

        let exact = "b".repeat(200);
        assert_eq!(truncate_chars(&exact, 200), exact);
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        let text = "咖啡".repeat(100);
        let truncated = truncate_chars(&text, 120);
        assert_eq!(truncated.chars().count(), 123);
        assert!(truncated.starts_with("咖啡"));
    }
}
