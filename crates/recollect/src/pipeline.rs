//! Memory pipeline facade
//!
//! Bundles the retrieval aggregator and the conversation committer behind
//! the two operations the response flow needs: assemble context before the
//! model call, commit the turn after it.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{info, warn};

use crate::backend::{HttpMemoryBackend, MemoryBackend};
use crate::config::Config;
use crate::error::{RecollectError, Result};
use crate::memory::commit::ConversationCommitter;
use crate::memory::retrieval::RetrievalAggregator;
use crate::memory::types::{CommitResult, ConversationTurn, HistoryTurn, MemorySession};
use crate::storage::{DirectSearch, LanceStore};

pub struct MemoryPipeline {
    backend: Arc<dyn MemoryBackend>,
    aggregator: RetrievalAggregator,
    committer: Arc<ConversationCommitter>,
}

impl MemoryPipeline {
    pub fn new(backend: Arc<dyn MemoryBackend>, config: &Config) -> Self {
        info!("Memory pipeline on {} backend", backend.name());
        Self {
            aggregator: RetrievalAggregator::new(backend.clone(), config),
            committer: Arc::new(ConversationCommitter::new(backend.clone(), &config.commit)),
            backend,
        }
    }

    pub fn with_direct_store(mut self, store: Arc<dyn DirectSearch>) -> Self {
        self.aggregator = self.aggregator.with_direct_store(store);
        self
    }

    /// Build a pipeline on the HTTP backend and, if enabled, the direct store.
    ///
    /// A direct store that cannot be opened is skipped with a warning.
    pub async fn connect(config: &Config) -> Result<Self> {
        let backend = Arc::new(HttpMemoryBackend::new(&config.backend)?);
        let pipeline = Self::new(backend, config);

        if !config.store.enabled {
            return Ok(pipeline);
        }

        match LanceStore::open(&config.store.data_dir).await {
            Ok(store) => {
                info!("Direct store opened at {}", config.store.data_dir.display());
                Ok(pipeline.with_direct_store(Arc::new(store)))
            }
            Err(e) => {
                warn!("Direct store unavailable, continuing without it: {}", e);
                Ok(pipeline)
            }
        }
    }

    /// Narrative memory context for `query`; the placeholder on a miss
    pub async fn assemble_context(&self, query: &str, session: &MemorySession) -> String {
        self.aggregator.assemble_context(query, session).await
    }

    /// Text returned when nothing is remembered
    pub fn placeholder(&self) -> &str {
        self.aggregator.formatter().placeholder()
    }

    /// Most recent conversation turns, newest first
    pub async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryTurn>> {
        let mut turns = self.backend.conversation_history(limit).await?;
        turns.truncate(limit);
        Ok(turns)
    }

    /// Commit a turn, awaiting visibility confirmation
    pub async fn commit_turn(&self, turn: &ConversationTurn) -> Result<CommitResult> {
        self.committer.commit(turn).await
    }

    /// Commit a turn on a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_commit(&self, turn: ConversationTurn) -> PendingCommit {
        let (tx, rx) = oneshot::channel();
        let committer = self.committer.clone();

        tokio::spawn(async move {
            let result = committer.commit(&turn).await;
            if tx.send(result).is_err() {
                warn!("Commit finished after its result was abandoned");
            }
        });

        PendingCommit { receiver: Some(rx) }
    }
}

/// Result of a background commit, handed over exactly once
#[derive(Debug)]
pub struct PendingCommit {
    receiver: Option<oneshot::Receiver<Result<CommitResult>>>,
}

impl PendingCommit {
    /// Take the result if the commit has finished.
    ///
    /// Returns `None` while the commit is running and after the result was taken.
    pub fn try_take(&mut self) -> Option<Result<CommitResult>> {
        let receiver = self.receiver.as_mut()?;
        let result = match receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => Err(abandoned()),
        };
        self.receiver = None;
        Some(result)
    }

    /// Whether the result has already been taken
    pub fn is_taken(&self) -> bool {
        self.receiver.is_none()
    }

    /// Wait for the commit to finish
    pub async fn wait(self) -> Result<CommitResult> {
        match self.receiver {
            Some(receiver) => receiver.await.unwrap_or_else(|_| Err(abandoned())),
            None => Err(RecollectError::General(
                "Commit result was already taken".to_string(),
            )),
        }
    }
}

fn abandoned() -> RecollectError {
    RecollectError::General("Commit task ended without a result".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::testing::{MockBackend, Visibility, history_turn, record};
    use std::time::Duration;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.commit.settle_delay_ms = 5;
        config.commit.poll_interval_ms = 5;
        config.commit.poll_budget_ms = 100;
        config
    }

    #[tokio::test]
    async fn test_assemble_and_commit() {
        let backend = Arc::new(
            MockBackend::new().with_context(vec![record("User likes coffee", "essential")]),
        );
        let pipeline = MemoryPipeline::new(backend.clone(), &fast_config());
        let session = MemorySession::new(crate::memory::MemoryMode::Conscious, "default_user");

        let narrative = pipeline.assemble_context("coffee", &session).await;
        assert_eq!(narrative, "I remember coffee.");

        let turn = ConversationTurn::new("coffee?", "Always.", "model-a");
        let result = pipeline.commit_turn(&turn).await.unwrap();
        assert!(result.confirmed);
        assert_eq!(backend.recorded(), vec![turn]);
    }

    #[tokio::test]
    async fn test_spawn_commit_delivers_once() {
        let backend = Arc::new(
            MockBackend::new().with_indexing_agent(Visibility::After(Duration::from_millis(20))),
        );
        let pipeline = MemoryPipeline::new(backend, &fast_config());

        let mut pending = pipeline.spawn_commit(ConversationTurn::new("hi", "hello", "m"));
        assert!(pending.try_take().is_none());
        assert!(!pending.is_taken());

        let mut result = None;
        for _ in 0..100 {
            if let Some(taken) = pending.try_take() {
                result = Some(taken);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let result = result.expect("commit finished").unwrap();
        assert!(result.confirmed);
        assert!(pending.is_taken());
        assert!(pending.try_take().is_none());
        assert!(matches!(
            pending.wait().await,
            Err(RecollectError::General(_))
        ));
    }

    #[tokio::test]
    async fn test_spawn_commit_wait_reports_write_failure() {
        let backend = Arc::new(
            MockBackend::new()
                .with_record_error(BackendError::Unavailable("down".to_string())),
        );
        let pipeline = MemoryPipeline::new(backend, &fast_config());

        let pending = pipeline.spawn_commit(ConversationTurn::new("hi", "hello", "m"));
        assert!(matches!(
            pending.wait().await,
            Err(RecollectError::CommitWrite(_))
        ));
    }

    #[tokio::test]
    async fn test_recent_history_is_capped() {
        let backend = MockBackend::new().with_history(vec![
            history_turn("third", "c"),
            history_turn("second", "b"),
            history_turn("first", "a"),
        ]);
        let pipeline = MemoryPipeline::new(Arc::new(backend), &fast_config());

        let turns = pipeline.recent_history(2).await.unwrap();
        let inputs: Vec<_> = turns.iter().map(|t| t.user_input.as_str()).collect();
        assert_eq!(inputs, vec!["third", "second"]);
    }

    #[tokio::test]
    async fn test_recent_history_reports_backend_error() {
        let backend = MockBackend::new().with_history_error(BackendError::Status {
            status: 503,
            body: "busy".to_string(),
        });
        let pipeline = MemoryPipeline::new(Arc::new(backend), &fast_config());

        let err = pipeline.recent_history(3).await.unwrap_err();
        assert!(matches!(
            err,
            RecollectError::Backend(BackendError::Status { status: 503, .. })
        ));
    }

    #[test]
    fn test_placeholder_from_config() {
        let mut config = Config::default();
        config.narrative.placeholder = "(nothing yet)".to_string();
        let pipeline = MemoryPipeline::new(Arc::new(MockBackend::new()), &config);
        assert_eq!(pipeline.placeholder(), "(nothing yet)");
    }
}
