//! Memory backend collaborator
//!
//! The backend is a black box that stores past conversations and exposes
//! context, history and search read surfaces plus one write surface.
//! Optional surfaces default to [`BackendError::Unsupported`].

pub mod http;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::{BackendError, BackendResult};
use crate::memory::types::{ChatId, ConversationTurn, HistoryTurn, RawMemoryRecord};

pub use http::HttpMemoryBackend;

/// Who a ranked search is performed for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchScope {
    pub scope: String,
    pub user_id: String,
    pub assistant_id: Option<String>,
    pub session_id: Option<String>,
}

/// Trait for memory backends (remote service, in-process store, mocks)
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Contextual retrieval with classification metadata
    async fn retrieve_context(&self, query: &str, limit: usize)
    -> BackendResult<Vec<RawMemoryRecord>>;

    /// Most recent conversation turns, newest first
    async fn conversation_history(&self, limit: usize) -> BackendResult<Vec<HistoryTurn>>;

    /// Backend-flagged essential memories
    async fn essential_conversations(&self, limit: usize) -> BackendResult<Vec<RawMemoryRecord>>;

    /// Ranked search; absent on backends without a search engine
    async fn execute_search(
        &self,
        _query: &str,
        _scope: &SearchScope,
        _limit: usize,
    ) -> BackendResult<Vec<RawMemoryRecord>> {
        Err(BackendError::Unsupported("search"))
    }

    /// Dynamic per-query retrieval; absent on backends without auto-ingest
    async fn auto_ingest_context(&self, _query: &str) -> BackendResult<Vec<RawMemoryRecord>> {
        Err(BackendError::Unsupported("auto-ingest"))
    }

    /// Write one exchange and return its identifier
    async fn record_conversation(&self, turn: &ConversationTurn) -> BackendResult<ChatId>;

    /// Whether writes are processed by an asynchronous indexing agent
    fn has_indexing_agent(&self) -> bool {
        false
    }

    /// Push notification fired once `chat_id` is visible in history.
    ///
    /// Backends without push support return `None` and are polled instead.
    fn subscribe_visibility(&self, _chat_id: &ChatId) -> Option<oneshot::Receiver<()>> {
        None
    }

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// A retrieval source consulted while assembling context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Context,
    History,
    Essential,
    Search,
    AutoIngest,
    DirectStore,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Context => "retrieve_context",
            Source::History => "conversation_history",
            Source::Essential => "essential_conversations",
            Source::Search => "search_engine",
            Source::AutoIngest => "auto_ingest",
            Source::DirectStore => "direct_store",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit outcome of one source call
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome<T> {
    /// The source answered
    Fetched(T),
    /// The source is absent or disabled
    Unsupported,
    /// The source errored or timed out
    Failed { reason: String },
}

impl<T> SourceOutcome<T> {
    /// Build an outcome from a backend result
    pub fn from_result(result: BackendResult<T>) -> Self {
        match result {
            Ok(value) => SourceOutcome::Fetched(value),
            Err(BackendError::Unsupported(_)) => SourceOutcome::Unsupported,
            Err(e) => SourceOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// The fetched value, if any
    pub fn fetched(self) -> Option<T> {
        match self {
            SourceOutcome::Fetched(value) => Some(value),
            _ => None,
        }
    }
}
