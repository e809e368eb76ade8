//! Test utilities for recollect - scriptable mocks
//!
//! This module provides in-memory stand-ins for the collaborators:
//! - `MockBackend`: every surface scripted, with call counters and
//!   configurable write visibility for commit tests
//! - `MockDirectStore`: an in-memory direct store

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::backend::{MemoryBackend, SearchScope};
use crate::error::{BackendError, BackendResult, RecollectError, Result};
use crate::memory::types::{ChatId, ConversationTurn, HistoryTurn, RawMemoryRecord};
use crate::storage::{DirectSearch, StoredMemory};

/// Build a record carrying `content` and a classification
pub fn record(content: &str, classification: &str) -> RawMemoryRecord {
    RawMemoryRecord {
        content: Some(content.to_string()),
        classification: Some(classification.to_string()),
        ..RawMemoryRecord::default()
    }
}

/// Build a record carrying `content` and a memory type
pub fn typed_record(content: &str, memory_type: &str) -> RawMemoryRecord {
    RawMemoryRecord {
        content: Some(content.to_string()),
        memory_type: Some(memory_type.to_string()),
        ..RawMemoryRecord::default()
    }
}

pub fn history_turn(user_input: &str, ai_output: &str) -> HistoryTurn {
    HistoryTurn {
        user_input: user_input.to_string(),
        ai_output: ai_output.to_string(),
        created_at: None,
    }
}

/// When a recorded turn becomes visible in history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Immediate,
    After(Duration),
    Never,
}

/// How the mock answers `subscribe_visibility`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushSignal {
    /// No push support; the committer polls
    Unsupported,
    /// Fire once the turn becomes visible
    OnVisible,
    /// Hand out a receiver whose sender is dropped immediately
    Dropped,
}

struct Script {
    context: BackendResult<Vec<RawMemoryRecord>>,
    history: BackendResult<Vec<HistoryTurn>>,
    essential: BackendResult<Vec<RawMemoryRecord>>,
    search: BackendResult<Vec<RawMemoryRecord>>,
    auto_ingest: BackendResult<Vec<RawMemoryRecord>>,
    record_error: Option<BackendError>,
    indexing_agent: bool,
    visibility: Visibility,
    push: PushSignal,
    latency: Option<Duration>,
}

#[derive(Default)]
struct Runtime {
    recorded: Vec<Recorded>,
    calls: HashMap<&'static str, usize>,
    parked_signals: Vec<oneshot::Sender<()>>,
}

struct Recorded {
    chat_id: ChatId,
    turn: ConversationTurn,
    visible_at: Option<Instant>,
}

/// Scriptable in-memory memory backend.
///
/// Unscripted read surfaces return empty lists; search and auto-ingest are
/// unsupported until scripted.
pub struct MockBackend {
    script: Script,
    runtime: Mutex<Runtime>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            script: Script {
                context: Ok(Vec::new()),
                history: Ok(Vec::new()),
                essential: Ok(Vec::new()),
                search: Err(BackendError::Unsupported("search")),
                auto_ingest: Err(BackendError::Unsupported("auto-ingest")),
                record_error: None,
                indexing_agent: false,
                visibility: Visibility::Immediate,
                push: PushSignal::Unsupported,
                latency: None,
            },
            runtime: Mutex::new(Runtime::default()),
        }
    }

    pub fn with_context(mut self, records: Vec<RawMemoryRecord>) -> Self {
        self.script.context = Ok(records);
        self
    }

    pub fn with_context_error(mut self, error: BackendError) -> Self {
        self.script.context = Err(error);
        self
    }

    /// History turns, newest first
    pub fn with_history(mut self, turns: Vec<HistoryTurn>) -> Self {
        self.script.history = Ok(turns);
        self
    }

    pub fn with_history_error(mut self, error: BackendError) -> Self {
        self.script.history = Err(error);
        self
    }

    pub fn with_essential(mut self, records: Vec<RawMemoryRecord>) -> Self {
        self.script.essential = Ok(records);
        self
    }

    pub fn with_essential_error(mut self, error: BackendError) -> Self {
        self.script.essential = Err(error);
        self
    }

    pub fn with_search(mut self, records: Vec<RawMemoryRecord>) -> Self {
        self.script.search = Ok(records);
        self
    }

    pub fn with_search_error(mut self, error: BackendError) -> Self {
        self.script.search = Err(error);
        self
    }

    pub fn with_auto_ingest(mut self, records: Vec<RawMemoryRecord>) -> Self {
        self.script.auto_ingest = Ok(records);
        self
    }

    pub fn with_auto_ingest_error(mut self, error: BackendError) -> Self {
        self.script.auto_ingest = Err(error);
        self
    }

    pub fn with_record_error(mut self, error: BackendError) -> Self {
        self.script.record_error = Some(error);
        self
    }

    /// Report an indexing agent; recorded turns appear in history per `visibility`
    pub fn with_indexing_agent(mut self, visibility: Visibility) -> Self {
        self.script.indexing_agent = true;
        self.script.visibility = visibility;
        self
    }

    pub fn with_push_signal(mut self, push: PushSignal) -> Self {
        self.script.push = push;
        self
    }

    /// Delay every read surface by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.script.latency = Some(latency);
        self
    }

    /// Number of calls made to a surface, by trait method name
    pub fn calls(&self, surface: &str) -> usize {
        self.runtime().calls.get(surface).copied().unwrap_or(0)
    }

    /// Turns written through `record_conversation`, oldest first
    pub fn recorded(&self) -> Vec<ConversationTurn> {
        self.runtime()
            .recorded
            .iter()
            .map(|r| r.turn.clone())
            .collect()
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self, surface: &'static str) {
        *self.runtime().calls.entry(surface).or_insert(0) += 1;
        if let Some(latency) = self.script.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn visible_at(&self, chat_id: &ChatId) -> Option<Option<Instant>> {
        self.runtime()
            .recorded
            .iter()
            .find(|r| &r.chat_id == chat_id)
            .map(|r| r.visible_at)
    }
}

#[async_trait]
impl MemoryBackend for MockBackend {
    async fn retrieve_context(
        &self,
        _query: &str,
        limit: usize,
    ) -> BackendResult<Vec<RawMemoryRecord>> {
        self.enter("retrieve_context").await;
        let mut records = self.script.context.clone()?;
        records.truncate(limit);
        Ok(records)
    }

    async fn conversation_history(&self, limit: usize) -> BackendResult<Vec<HistoryTurn>> {
        self.enter("conversation_history").await;
        let scripted = self.script.history.clone()?;

        let now = Instant::now();
        let mut turns: Vec<HistoryTurn> = self
            .runtime()
            .recorded
            .iter()
            .rev()
            .filter(|r| r.visible_at.is_some_and(|at| at <= now))
            .map(|r| history_turn(&r.turn.user_input, &r.turn.ai_output))
            .collect();
        turns.extend(scripted);
        turns.truncate(limit);
        Ok(turns)
    }

    async fn essential_conversations(&self, limit: usize) -> BackendResult<Vec<RawMemoryRecord>> {
        self.enter("essential_conversations").await;
        let mut records = self.script.essential.clone()?;
        records.truncate(limit);
        Ok(records)
    }

    async fn execute_search(
        &self,
        _query: &str,
        _scope: &SearchScope,
        limit: usize,
    ) -> BackendResult<Vec<RawMemoryRecord>> {
        self.enter("execute_search").await;
        let mut records = self.script.search.clone()?;
        records.truncate(limit);
        Ok(records)
    }

    async fn auto_ingest_context(&self, _query: &str) -> BackendResult<Vec<RawMemoryRecord>> {
        self.enter("auto_ingest_context").await;
        self.script.auto_ingest.clone()
    }

    async fn record_conversation(&self, turn: &ConversationTurn) -> BackendResult<ChatId> {
        *self
            .runtime()
            .calls
            .entry("record_conversation")
            .or_insert(0) += 1;
        if let Some(ref error) = self.script.record_error {
            return Err(error.clone());
        }

        let now = Instant::now();
        let visible_at = match self.script.visibility {
            Visibility::Immediate => Some(now),
            Visibility::After(delay) => Some(now + delay),
            Visibility::Never => None,
        };

        let mut runtime = self.runtime();
        let chat_id = ChatId::new(format!("chat-{:04}", runtime.recorded.len() + 1));
        runtime.recorded.push(Recorded {
            chat_id: chat_id.clone(),
            turn: turn.clone(),
            visible_at,
        });
        Ok(chat_id)
    }

    fn has_indexing_agent(&self) -> bool {
        self.script.indexing_agent
    }

    fn subscribe_visibility(&self, chat_id: &ChatId) -> Option<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        match self.script.push {
            PushSignal::Unsupported => return None,
            PushSignal::Dropped => drop(tx),
            PushSignal::OnVisible => match self.visible_at(chat_id).flatten() {
                Some(at) => {
                    tokio::spawn(async move {
                        tokio::time::sleep_until(at).await;
                        let _ = tx.send(());
                    });
                }
                None => self.runtime().parked_signals.push(tx),
            },
        }
        Some(rx)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// In-memory direct store
#[derive(Default)]
pub struct MockDirectStore {
    rows: Vec<StoredMemory>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockDirectStore {
    pub fn new(rows: Vec<StoredMemory>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// A store whose every search fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectSearch for MockDirectStore {
    async fn search_text(
        &self,
        query: &str,
        user_id: &str,
        per_set_limit: usize,
    ) -> Result<Vec<StoredMemory>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RecollectError::Storage("mock store offline".to_string()));
        }

        let needle = query.trim().to_lowercase();
        let matches = |row: &StoredMemory| {
            [&row.searchable_content, &row.summary, &row.processed_data]
                .into_iter()
                .flatten()
                .any(|text| text.to_lowercase().contains(&needle))
        };

        let mut per_set: HashMap<_, Vec<StoredMemory>> = HashMap::new();
        for row in self.rows.iter().filter(|r| r.user_id == user_id && matches(*r)) {
            per_set.entry(row.set).or_default().push(row.clone());
        }

        let mut merged = Vec::new();
        for (_, mut rows) in per_set {
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            rows.truncate(per_set_limit);
            merged.extend(rows);
        }
        merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(merged)
    }
}
