//! Narrative composition for memory context
//!
//! Turns a raw memory-context string into one natural-language sentence for
//! prompt injection. The raw text arrives in several shapes:
//!
//! - numbered list: `1. [ESSENTIAL] User likes coffee\n2. [CONTEXTUAL] User is 25`
//! - JSON array: `["User likes coffee", "User is 25"]`
//! - single-quoted list literal: `['User likes coffee', 'User is 25']`
//! - tagged or plain lines: `[CONTEXTUAL] User is 25\nUser likes coffee`
//!
//! Parsing is an ordered list of strategies; the first one that yields items
//! wins. When none does, the text is cleaned up and returned as-is.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::config::NarrativeConfig;

static ORDINAL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s*").expect("valid ordinal regex"));
static TAGGED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\]]+)\]\s*(.+)$").expect("valid tagged-line regex"));
static LEADING_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[^\]]+\]\s*").expect("valid leading-tag regex"));
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-\s*").expect("valid list-marker regex"));
static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]([^'"]+)['"]"#).expect("valid quoted regex"));
static ANY_ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\s*").expect("valid ordinal regex"));
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]+\]\s*").expect("valid tag regex"));
static ANY_LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^-\s*").expect("valid list-marker regex"));
static POSSESSIVE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(user|用户)\s+(likes|喜欢|is|是|has|有|prefers|偏好)\s*")
        .expect("valid possessive regex")
});
static LEADING_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[，,。.]+\s*").expect("valid punctuation regex"));
static TRAILING_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[，,。.]+$").expect("valid punctuation regex"));

/// Lines must be longer than this to count as a memory
const MIN_LINE_CHARS: usize = 3;

/// A memory fragment recovered from raw text, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    pub content: String,
    /// Bracket tag found in front of the content, if any
    pub tag: Option<String>,
}

impl ParsedItem {
    fn untagged(content: &str) -> Self {
        Self {
            content: content.trim().to_string(),
            tag: None,
        }
    }
}

type ParseStrategy = fn(&str) -> Option<Vec<ParsedItem>>;

/// Tried in order; the first strategy returning items ends the cascade
const STRATEGIES: [(&str, ParseStrategy); 3] = [
    ("list-literal", parse_list_literal),
    ("line", parse_lines),
    ("quoted", parse_quoted),
];

/// Run the parsing cascade over trimmed text
pub fn extract_items(text: &str) -> Option<Vec<ParsedItem>> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let items = strategy(text)?;
        debug!("Parsed {} memory items with {} strategy", items.len(), name);
        Some(items)
    })
}

fn non_empty(items: Vec<ParsedItem>) -> Option<Vec<ParsedItem>> {
    let items: Vec<ParsedItem> = items
        .into_iter()
        .filter(|item| !item.content.is_empty())
        .collect();
    if items.is_empty() { None } else { Some(items) }
}

fn parse_list_literal(text: &str) -> Option<Vec<ParsedItem>> {
    if !(text.starts_with('[') && text.ends_with(']')) {
        return None;
    }

    let elements = match serde_json::from_str::<Vec<Value>>(text) {
        Ok(values) => values.iter().map(json_element_text).collect(),
        Err(_) => parse_python_list(text)?,
    };

    non_empty(
        elements
            .iter()
            .map(|element| ParsedItem::untagged(element))
            .collect(),
    )
}

/// Element text, spelled the way the list-literal parser reads bare scalars
fn json_element_text(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Permissive list-literal parser: quoted strings (single or double, with
/// backslash escapes) and bare scalars, comma separated.
fn parse_python_list(text: &str) -> Option<Vec<String>> {
    let inner = text.strip_prefix('[')?.strip_suffix(']')?;
    let mut chars = inner.chars().peekable();
    let mut elements = Vec::new();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        match chars.peek().copied() {
            None => break,
            Some(quote @ ('\'' | '"')) => {
                chars.next();
                let mut element = String::new();
                loop {
                    match chars.next()? {
                        '\\' => match chars.next()? {
                            'n' => element.push('\n'),
                            't' => element.push('\t'),
                            other => element.push(other),
                        },
                        c if c == quote => break,
                        c => element.push(c),
                    }
                }
                elements.push(element);
            }
            Some(_) => {
                let mut token = String::new();
                while let Some(c) = chars.next_if(|c| *c != ',') {
                    token.push(c);
                }
                let token = token.trim();
                if !is_bare_scalar(token) {
                    return None;
                }
                elements.push(token.to_string());
            }
        }

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return None,
        }
    }

    Some(elements)
}

fn is_bare_scalar(token: &str) -> bool {
    matches!(token, "True" | "False" | "None") || token.parse::<f64>().is_ok()
}

fn parse_lines(text: &str) -> Option<Vec<ParsedItem>> {
    let mut items = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let line = ORDINAL_PREFIX.replace(line, "");
        let (tag, content) = match TAGGED_LINE.captures(&line) {
            Some(caps) => (Some(caps[1].to_string()), caps[2].trim().to_string()),
            None => (None, line.to_string()),
        };

        let content = LEADING_TAG.replace(&content, "");
        let content = content.trim();
        let content = LIST_MARKER.replace(content, "");
        let content = content.trim();

        if content.chars().count() > MIN_LINE_CHARS {
            items.push(ParsedItem {
                content: content.to_string(),
                tag,
            });
        }
    }

    non_empty(items)
}

fn parse_quoted(text: &str) -> Option<Vec<ParsedItem>> {
    non_empty(
        QUOTED
            .captures_iter(text)
            .map(|caps| ParsedItem::untagged(&caps[1]))
            .collect(),
    )
}

/// Strip ordinals, bracket tags and list markers from the whole text
fn cleanup(text: &str) -> String {
    let cleaned = ANY_ORDINAL.replace_all(text, "");
    let cleaned = ANY_TAG.replace_all(&cleaned, "");
    let cleaned = ANY_LIST_MARKER.replace_all(&cleaned, "");
    cleaned.trim().to_string()
}

/// Strip the "User likes/is/has/prefers" prefix and surrounding punctuation
pub fn normalize_item(content: &str) -> Option<String> {
    let content = POSSESSIVE_PREFIX.replace(content.trim(), "");
    let content = LEADING_PUNCT.replace(content.trim(), "");
    let content = TRAILING_PUNCT.replace(&content, "");
    let content = content.trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

/// Composes narrative sentences from raw memory context
#[derive(Debug, Clone)]
pub struct NarrativeFormatter {
    placeholder: String,
    max_items: usize,
}

impl Default for NarrativeFormatter {
    fn default() -> Self {
        Self::new(&NarrativeConfig::default())
    }
}

impl NarrativeFormatter {
    pub fn new(config: &NarrativeConfig) -> Self {
        Self {
            placeholder: config.placeholder.clone(),
            max_items: config.max_items.max(2),
        }
    }

    /// Text used when nothing is remembered
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Format raw memory context into a narrative.
    ///
    /// Never fails; returns either the placeholder or a non-empty sentence.
    pub fn format(&self, raw: &str) -> String {
        let text = raw.trim();
        if text.is_empty() {
            return self.placeholder.clone();
        }

        let Some(items) = extract_items(text) else {
            let cleaned = cleanup(text);
            debug!("No memory items parsed, falling back to cleaned text");
            return if cleaned.chars().count() > MIN_LINE_CHARS {
                cleaned
            } else {
                self.placeholder.clone()
            };
        };

        let normalized: Vec<String> = items
            .iter()
            .filter_map(|item| normalize_item(&item.content))
            .collect();

        let narrative = self.compose(&normalized);
        debug!(
            "Memory narrative: raw length={}, narrative length={}",
            raw.len(),
            narrative.len()
        );
        narrative
    }

    /// Compose a sentence from already-normalized items
    pub fn compose(&self, items: &[String]) -> String {
        match items {
            [] => self.placeholder.clone(),
            [only] => format!("I remember {only}."),
            [first, second] => format!("I remember {first}, and also {second}."),
            [rest @ .., last] if items.len() <= self.max_items => {
                format!("I remember {}, and also {last}.", rest.join(", "))
            }
            _ => format!(
                "I remember {}, and also {}, and some other things.",
                items[0],
                items[1..self.max_items].join(", ")
            ),
        }
    }
}
