//! Priority merge and deduplication of memory items
//!
//! Items are stable-sorted by their tag's priority, deduplicated on their
//! case-folded content (first occurrence in sorted order survives) and capped.

use std::collections::HashSet;

use crate::config::MergeConfig;
use crate::memory::types::MemoryItem;

/// Merge tagged items into one capped, deduplicated, priority-ordered list.
///
/// Deterministic and pure: the same input always yields the same output.
pub fn merge(items: Vec<MemoryItem>, config: &MergeConfig) -> Vec<MemoryItem> {
    let mut sorted = items;
    // sort_by_key is stable, so equal priorities keep their input order
    sorted.sort_by_key(|item| config.priorities.priority(item.tag));

    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(config.cap.min(sorted.len()));

    for item in sorted {
        if merged.len() >= config.cap {
            break;
        }
        let key = dedup_key(&item.content);
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        merged.push(item);
    }

    merged
}

fn dedup_key(content: &str) -> String {
    content.trim().to_lowercase()
}

/// Render merged items as a numbered list, one `N. [LABEL] content` per line
pub fn render_numbered(items: &[MemoryItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. [{}] {}", i + 1, item.label(), item.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagPriorities;
    use crate::memory::types::SourceTag;

    fn item(content: &str, tag: SourceTag) -> MemoryItem {
        MemoryItem::new(content, tag).unwrap()
    }

    #[test]
    fn test_higher_priority_duplicate_survives() {
        let items = vec![item("x", SourceTag::Dialogue), item("X", SourceTag::Essential)];
        let merged = merge(items, &MergeConfig::default());
        assert_eq!(merged, vec![item("X", SourceTag::Essential)]);
    }

    #[test]
    fn test_sorted_by_priority_with_stable_ties() {
        let items = vec![
            item("direct one", SourceTag::DirectStore),
            item("dialogue one", SourceTag::Dialogue),
            item("essential one", SourceTag::Essential),
            item("dialogue two", SourceTag::Dialogue),
            item("mystery", SourceTag::Unknown),
            item("contextual one", SourceTag::Contextual),
        ];
        let merged = merge(items, &MergeConfig::default());
        let contents: Vec<&str> = merged.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "essential one",
                "contextual one",
                "dialogue one",
                "dialogue two",
                "direct one",
                "mystery",
            ]
        );
    }

    #[test]
    fn test_output_never_exceeds_cap() {
        let items: Vec<MemoryItem> = (0..20)
            .map(|i| item(&format!("memory {i}"), SourceTag::Contextual))
            .collect();
        let merged = merge(items, &MergeConfig::default());
        assert_eq!(merged.len(), 6);
        assert_eq!(merged[0].content, "memory 0");
        assert_eq!(merged[5].content, "memory 5");
    }

    #[test]
    fn test_duplicates_do_not_consume_cap() {
        let mut items: Vec<MemoryItem> = (0..6)
            .map(|_| item("same", SourceTag::Contextual))
            .collect();
        items.push(item("different", SourceTag::Contextual));
        let merged = merge(items, &MergeConfig::default());
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_dedup_ignores_surrounding_whitespace_and_case() {
        let mut padded = item("placeholder", SourceTag::Contextual);
        padded.content = "  Likes Tea ".to_string();
        let items = vec![item("likes tea", SourceTag::Essential), padded];
        let merged = merge(items, &MergeConfig::default());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].tag, SourceTag::Essential);
    }

    #[test]
    fn test_tunable_priorities_and_cap() {
        let config = MergeConfig {
            cap: 2,
            priorities: TagPriorities {
                dialogue: 0,
                essential: 9,
                ..TagPriorities::default()
            },
        };
        let items = vec![
            item("essential", SourceTag::Essential),
            item("contextual", SourceTag::Contextual),
            item("dialogue", SourceTag::Dialogue),
        ];
        let merged = merge(items, &config);
        let contents: Vec<&str> = merged.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["dialogue", "contextual"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(merge(Vec::new(), &MergeConfig::default()).is_empty());
    }

    #[test]
    fn test_render_numbered() {
        let items = vec![
            item("User likes coffee", SourceTag::Essential),
            item("User: hi", SourceTag::Dialogue),
        ];
        assert_eq!(
            render_numbered(&items),
            "1. [ESSENTIAL] User likes coffee\n2. [DIALOGUE] User: hi"
        );
    }
}
