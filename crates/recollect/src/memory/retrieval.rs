//! Memory retrieval aggregation
//!
//! This module implements the per-query fallback chain:
//! 1. Dispatch on memory mode (conscious, auto, combined)
//! 2. Query backend surfaces, each isolated behind its own timeout
//! 3. Merge the concatenated items by priority
//! 4. Compose the narrative handed to the prompt builder

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{MemoryBackend, SearchScope, Source, SourceOutcome};
use crate::config::{Config, MergeConfig, RetrievalConfig};
use crate::error::{BackendError, BackendResult};
use crate::memory::extract::truncate_chars;
use crate::memory::merge::{merge, render_numbered};
use crate::memory::narrative::NarrativeFormatter;
use crate::memory::types::{
    HistoryTurn, MemoryItem, MemoryMode, MemorySession, RawMemoryRecord, SourceTag,
};
use crate::storage::DirectSearch;

/// Gathers memory items from every configured source and turns them into a
/// narrative. Never fails: total backend failure yields the placeholder.
pub struct RetrievalAggregator {
    backend: Arc<dyn MemoryBackend>,
    direct_store: Option<Arc<dyn DirectSearch>>,
    config: RetrievalConfig,
    merge_config: MergeConfig,
    per_set_limit: usize,
    formatter: NarrativeFormatter,
}

impl RetrievalAggregator {
    pub fn new(backend: Arc<dyn MemoryBackend>, config: &Config) -> Self {
        Self {
            backend,
            direct_store: None,
            config: config.retrieval.clone(),
            merge_config: config.merge.clone(),
            per_set_limit: config.store.per_set_limit,
            formatter: NarrativeFormatter::new(&config.narrative),
        }
    }

    /// Attach the direct store consulted as the last fallback
    pub fn with_direct_store(mut self, store: Arc<dyn DirectSearch>) -> Self {
        self.direct_store = Some(store);
        self
    }

    pub fn formatter(&self) -> &NarrativeFormatter {
        &self.formatter
    }

    /// Assemble the narrative memory context for `query`
    pub async fn assemble_context(&self, query: &str, session: &MemorySession) -> String {
        let items = self.collect(query, session).await;
        if items.is_empty() {
            info!("No memories found for query");
            return self.formatter.placeholder().to_string();
        }

        self.formatter.format(&render_numbered(&items))
    }

    /// Gather, concatenate and merge items for `query` under the session's mode
    pub async fn collect(&self, query: &str, session: &MemorySession) -> Vec<MemoryItem> {
        let items = match session.mode {
            MemoryMode::Conscious => self.collect_generic(query, session).await,
            MemoryMode::Auto => match self.collect_auto(query).await {
                Some(items) => items,
                None => {
                    info!("Auto retrieval found nothing, falling back to generic chain");
                    self.collect_generic(query, session).await
                }
            },
            MemoryMode::Combined => {
                let items = self.collect_combined(query, session).await;
                if items.is_empty() {
                    info!("Combined retrieval found nothing, falling back to generic chain");
                    self.collect_generic(query, session).await
                } else {
                    items
                }
            }
        };

        let collected = items.len();
        let merged = merge(items, &self.merge_config);
        info!(
            "Retrieved {} memories ({} before merge, mode: {})",
            merged.len(),
            collected,
            session.mode
        );
        merged
    }

    /// Dynamic per-query retrieval; `None` when the surface failed or gave nothing
    async fn collect_auto(&self, query: &str) -> Option<Vec<MemoryItem>> {
        let records = self
            .run_source(Source::AutoIngest, self.backend.auto_ingest_context(query))
            .await
            .fetched()?;

        let items: Vec<MemoryItem> = records
            .iter()
            .take(self.config.dynamic_limit)
            .filter_map(|record| self.to_item(record, memory_type_tag(record)))
            .collect();

        (!items.is_empty()).then_some(items)
    }

    /// Essential records followed by ranked search (or auto-ingest) results
    async fn collect_combined(&self, query: &str, session: &MemorySession) -> Vec<MemoryItem> {
        let mut items = Vec::new();
        let mut seen_ids = HashSet::new();

        let essential = self
            .run_source(
                Source::Essential,
                self.backend
                    .essential_conversations(self.config.essential_limit),
            )
            .await
            .fetched()
            .unwrap_or_default();
        for record in essential.iter().take(self.config.essential_limit) {
            self.push_unique(record, SourceTag::Essential, &mut seen_ids, &mut items);
        }
        debug!("Combined: {} essential memories", items.len());

        let scope = SearchScope {
            scope: self.config.search_scope.clone(),
            user_id: session.user_id.clone(),
            assistant_id: session.assistant_id.clone(),
            session_id: session.session_id.clone(),
        };
        let mut dynamic = self
            .run_source(
                Source::Search,
                self.backend
                    .execute_search(query, &scope, self.config.search_limit),
            )
            .await
            .fetched()
            .unwrap_or_default();
        if dynamic.is_empty() {
            debug!("Combined: ranked search gave nothing, using auto-ingest");
            dynamic = self
                .run_source(Source::AutoIngest, self.backend.auto_ingest_context(query))
                .await
                .fetched()
                .unwrap_or_default();
        }

        let before = items.len();
        for record in dynamic.iter().take(self.config.dynamic_limit) {
            debug!(
                "Combined: dynamic memory via {}",
                record.retrieval_method.as_deref().unwrap_or("unknown")
            );
            self.push_unique(record, memory_type_tag(record), &mut seen_ids, &mut items);
        }
        debug!("Combined: {} dynamic memories", items.len() - before);

        items.truncate(self.config.combined_raw_cap);
        items
    }

    /// Contextual retrieval, then history, then the direct store
    async fn collect_generic(&self, query: &str, session: &MemorySession) -> Vec<MemoryItem> {
        let mut items = Vec::new();

        if let Some(records) = self
            .run_source(
                Source::Context,
                self.backend
                    .retrieve_context(query, self.config.context_limit),
            )
            .await
            .fetched()
        {
            items.extend(
                records
                    .iter()
                    .take(self.config.context_limit)
                    .filter_map(|record| self.to_item(record, classification_tag(record))),
            );
        }

        if items.len() < self.config.supplement_threshold {
            if let Some(turns) = self
                .run_source(
                    Source::History,
                    self.backend.conversation_history(self.config.history_limit),
                )
                .await
                .fetched()
            {
                self.add_dialogue(query, &turns, &mut items);
            }
        }

        if items.len() < self.config.min_items {
            match &self.direct_store {
                Some(store) => {
                    let user_id = session.user_id.as_str();
                    let search = async {
                        store
                            .search_text(query, user_id, self.per_set_limit)
                            .await
                            .map_err(|e| BackendError::Unavailable(e.to_string()))
                    };
                    if let Some(rows) = self.run_source(Source::DirectStore, search).await.fetched()
                    {
                        items.extend(
                            rows.iter()
                                .filter_map(|row| row.display_text(self.config.content_max_chars))
                                .take(self.config.direct_store_take)
                                .filter_map(|text| MemoryItem::new(text, SourceTag::DirectStore)),
                        );
                    }
                }
                None => debug!("No direct store configured"),
            }
        }

        items
    }

    /// Append dialogue lines from history turns.
    ///
    /// A turn is taken when relevant to the query, or unconditionally while
    /// fewer than `min_items` items are collected. Stops once `dialogue_stop`
    /// items are collected in total.
    fn add_dialogue(&self, query: &str, turns: &[HistoryTurn], items: &mut Vec<MemoryItem>) {
        for turn in turns {
            if is_relevant_turn(query, turn) || items.len() < self.config.min_items {
                for (speaker, text) in [("User", &turn.user_input), ("AI", &turn.ai_output)] {
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    let line = format!(
                        "{speaker}: {}",
                        truncate_chars(text, self.config.dialogue_max_chars)
                    );
                    items.extend(MemoryItem::new(line, SourceTag::Dialogue));
                }
            }

            if items.len() >= self.config.dialogue_stop {
                break;
            }
        }
    }

    fn to_item(&self, record: &RawMemoryRecord, tag: SourceTag) -> Option<MemoryItem> {
        let content = record.extract_content()?;
        let content = truncate_chars(&content, self.config.content_max_chars);
        Some(
            MemoryItem::new(content, tag)?
                .with_memory_id(record.memory_id.clone())
                .with_memory_type(record.memory_type.clone()),
        )
    }

    /// Push an item unless its memory id was already taken
    fn push_unique(
        &self,
        record: &RawMemoryRecord,
        tag: SourceTag,
        seen_ids: &mut HashSet<String>,
        items: &mut Vec<MemoryItem>,
    ) {
        if let Some(id) = record.memory_id.as_deref().filter(|id| !id.is_empty()) {
            if seen_ids.contains(id) {
                return;
            }
        }
        if let Some(item) = self.to_item(record, tag) {
            if let Some(ref id) = item.memory_id {
                seen_ids.insert(id.clone());
            }
            items.push(item);
        }
    }

    /// Run one source call under the per-source timeout
    async fn run_source<T>(
        &self,
        source: Source,
        call: impl Future<Output = BackendResult<T>>,
    ) -> SourceOutcome<T> {
        let outcome = match tokio::time::timeout(self.config.source_timeout(), call).await {
            Ok(result) => SourceOutcome::from_result(result),
            Err(_) => SourceOutcome::Failed {
                reason: BackendError::Timeout.to_string(),
            },
        };

        match &outcome {
            SourceOutcome::Fetched(_) => debug!("{} answered on {}", source, self.backend.name()),
            SourceOutcome::Unsupported => debug!("{} unavailable on this backend", source),
            SourceOutcome::Failed { reason } => warn!("{} failed: {}", source, reason),
        }
        outcome
    }
}

fn classification_tag(record: &RawMemoryRecord) -> SourceTag {
    record
        .classification
        .as_deref()
        .map_or(SourceTag::Unknown, SourceTag::from_label)
}

fn memory_type_tag(record: &RawMemoryRecord) -> SourceTag {
    record
        .memory_type
        .as_deref()
        .map_or(SourceTag::Unknown, SourceTag::from_label)
}

/// Whether a history turn relates to the query.
///
/// True when the lower-cased query is a substring of either side, or when any
/// query word longer than one character appears in either side. An empty
/// query relates to nothing.
pub fn is_relevant_turn(query: &str, turn: &HistoryTurn) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return false;
    }

    let user = turn.user_input.to_lowercase();
    let ai = turn.ai_output.to_lowercase();
    if user.contains(&query) || ai.contains(&query) {
        return true;
    }

    query
        .split_whitespace()
        .filter(|word| word.chars().count() > 1)
        .any(|word| user.contains(word) || ai.contains(word))
}
