//! Conversation commit with bounded visibility confirmation
//!
//! A turn is written once, then, when the backend runs an asynchronous
//! indexing agent, the committer waits for the turn to show up in history:
//!
//! `Recording -> Settling -> Polling -> {Confirmed | TimedOut}`
//!
//! Both terminal states return the chat id. Only a failed write is an error.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::MemoryBackend;
use crate::config::CommitConfig;
use crate::error::{RecollectError, Result};
use crate::memory::types::{CommitResult, ConversationTurn};

/// States of the commit protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    Recording,
    Settling,
    Polling,
    Confirmed,
    TimedOut,
}

impl fmt::Display for CommitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitPhase::Recording => "recording",
            CommitPhase::Settling => "settling",
            CommitPhase::Polling => "polling",
            CommitPhase::Confirmed => "confirmed",
            CommitPhase::TimedOut => "timed out",
        };
        f.write_str(name)
    }
}

/// Writes conversation turns and confirms their visibility
pub struct ConversationCommitter {
    backend: Arc<dyn MemoryBackend>,
    config: CommitConfig,
}

impl ConversationCommitter {
    pub fn new(backend: Arc<dyn MemoryBackend>, config: &CommitConfig) -> Self {
        Self {
            backend,
            config: config.clone(),
        }
    }

    /// Record `turn` and wait, within the poll budget, until it is visible.
    ///
    /// Returns `RecollectError::CommitWrite` when the write itself fails.
    /// A visibility timeout is not an error: the result carries
    /// `confirmed: false` and the chat id.
    pub async fn commit(&self, turn: &ConversationTurn) -> Result<CommitResult> {
        debug!("Commit phase: {}", CommitPhase::Recording);
        let chat_id = self
            .backend
            .record_conversation(turn)
            .await
            .map_err(|e| {
                warn!("Failed to record conversation: {}", e);
                RecollectError::CommitWrite(e.to_string())
            })?;
        info!("Conversation recorded: {}", chat_id.short());

        if !self.backend.has_indexing_agent() {
            debug!("Commit phase: {} (no indexing agent)", CommitPhase::Confirmed);
            return Ok(CommitResult {
                chat_id,
                confirmed: true,
                waited: Duration::ZERO,
            });
        }

        let started = Instant::now();
        debug!("Commit phase: {}", CommitPhase::Settling);
        tokio::time::sleep(self.config.settle_delay()).await;

        debug!("Commit phase: {}", CommitPhase::Polling);
        let confirmed = match self.backend.subscribe_visibility(&chat_id) {
            Some(signal) => self.await_signal(signal, turn).await,
            None => self.poll(turn, self.config.poll_budget()).await,
        };
        let waited = started.elapsed();

        if confirmed {
            info!(
                "Commit phase: {} for {} after {:?}",
                CommitPhase::Confirmed,
                chat_id.short(),
                waited
            );
        } else {
            warn!(
                "Commit phase: {} for {}; memory processing may be incomplete",
                CommitPhase::TimedOut,
                chat_id.short()
            );
        }

        Ok(CommitResult {
            chat_id,
            confirmed,
            waited,
        })
    }

    /// Wait for the backend's push signal; poll for the rest of the budget
    /// if the signal goes away.
    async fn await_signal(&self, signal: oneshot::Receiver<()>, turn: &ConversationTurn) -> bool {
        let budget = self.config.poll_budget();
        let started = Instant::now();

        match tokio::time::timeout(budget, signal).await {
            Ok(Ok(())) => {
                debug!("Visibility signal received");
                true
            }
            Ok(Err(_)) => {
                debug!("Visibility signal dropped, polling instead");
                self.poll(turn, budget.saturating_sub(started.elapsed()))
                    .await
            }
            Err(_) => false,
        }
    }

    /// Read history every interval until the turn appears or `budget` has
    /// elapsed. Reads and sleeps both count against the budget.
    async fn poll(&self, turn: &ConversationTurn, budget: Duration) -> bool {
        let interval = self.config.poll_interval().max(Duration::from_millis(1));
        let started = Instant::now();
        let deadline = started + budget;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }

            let read = self
                .backend
                .conversation_history(self.config.history_limit);
            match tokio::time::timeout(remaining, read).await {
                Ok(Ok(history)) if history.iter().any(|entry| turn.matches(entry)) => {
                    debug!("Turn visible in history after {:?}", started.elapsed());
                    return true;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Failed to check conversation history: {}", e),
                Err(_) => {
                    warn!("History read outlasted the poll budget");
                    return false;
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            tokio::time::sleep(interval.min(remaining)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::testing::{MockBackend, PushSignal, Visibility};

    fn fast_config() -> CommitConfig {
        CommitConfig {
            settle_delay_ms: 10,
            poll_interval_ms: 10,
            poll_budget_ms: 50,
            history_limit: 10,
        }
    }

    fn committer(backend: MockBackend) -> (ConversationCommitter, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let committer = ConversationCommitter::new(backend.clone(), &fast_config());
        (committer, backend)
    }

    fn turn() -> ConversationTurn {
        ConversationTurn::new("My name is Ada", "Nice to meet you, Ada!", "model-a")
    }

    #[tokio::test]
    async fn test_without_indexing_agent_confirms_immediately() {
        let (committer, backend) = committer(MockBackend::new());

        let result = committer.commit(&turn()).await.unwrap();
        assert!(result.confirmed);
        assert_eq!(result.waited, Duration::ZERO);
        assert_eq!(backend.calls("conversation_history"), 0);
        assert_eq!(backend.recorded(), vec![turn()]);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let (committer, backend) = committer(
            MockBackend::new()
                .with_indexing_agent(Visibility::Immediate)
                .with_record_error(BackendError::Unavailable("refused".to_string())),
        );

        let result = committer.commit(&turn()).await;
        assert!(matches!(result, Err(RecollectError::CommitWrite(_))));
        assert_eq!(backend.calls("conversation_history"), 0);
    }

    #[tokio::test]
    async fn test_visible_turn_is_confirmed() {
        let (committer, backend) =
            committer(MockBackend::new().with_indexing_agent(Visibility::Immediate));

        let result = committer.commit(&turn()).await.unwrap();
        assert!(result.confirmed);
        assert_eq!(backend.calls("conversation_history"), 1);
        assert!(result.waited >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_delayed_visibility_is_confirmed() {
        let (committer, backend) = committer(
            MockBackend::new().with_indexing_agent(Visibility::After(Duration::from_millis(25))),
        );

        let result = committer.commit(&turn()).await.unwrap();
        assert!(result.confirmed);
        assert!(backend.calls("conversation_history") >= 2);
    }

    #[tokio::test]
    async fn test_never_visible_times_out_with_chat_id() {
        let (committer, backend) =
            committer(MockBackend::new().with_indexing_agent(Visibility::Never));

        let result = committer.commit(&turn()).await.unwrap();
        assert_eq!(result.chat_id.as_str(), "chat-0001");
        assert!(!result.confirmed);
        assert!((4..=5).contains(&backend.calls("conversation_history")));
        assert!(result.waited >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_history_errors_consume_budget() {
        let (committer, backend) = committer(
            MockBackend::new()
                .with_indexing_agent(Visibility::Immediate)
                .with_history_error(BackendError::Timeout),
        );

        let result = committer.commit(&turn()).await.unwrap();
        assert!(!result.confirmed);
        assert!((4..=5).contains(&backend.calls("conversation_history")));
    }

    #[tokio::test]
    async fn test_slow_history_reads_stay_within_budget() {
        let (committer, backend) = committer(
            MockBackend::new()
                .with_indexing_agent(Visibility::Never)
                .with_latency(Duration::from_millis(100)),
        );

        let result = committer.commit(&turn()).await.unwrap();
        assert!(!result.confirmed);
        assert_eq!(backend.calls("conversation_history"), 1);
        // settle 10ms + budget 50ms, with scheduling slack
        assert!(result.waited < Duration::from_millis(150), "{:?}", result.waited);
    }

    #[tokio::test]
    async fn test_slow_reads_still_confirm_visible_turn() {
        let (committer, _backend) = committer(
            MockBackend::new()
                .with_indexing_agent(Visibility::Immediate)
                .with_latency(Duration::from_millis(20)),
        );

        let result = committer.commit(&turn()).await.unwrap();
        assert!(result.confirmed);
    }

    #[tokio::test]
    async fn test_push_signal_skips_polling() {
        let (committer, backend) = committer(
            MockBackend::new()
                .with_indexing_agent(Visibility::After(Duration::from_millis(20)))
                .with_push_signal(PushSignal::OnVisible),
        );

        let result = committer.commit(&turn()).await.unwrap();
        assert!(result.confirmed);
        assert_eq!(backend.calls("conversation_history"), 0);
    }

    #[tokio::test]
    async fn test_push_signal_never_fires() {
        let (committer, backend) = committer(
            MockBackend::new()
                .with_indexing_agent(Visibility::Never)
                .with_push_signal(PushSignal::OnVisible),
        );

        let result = committer.commit(&turn()).await.unwrap();
        assert!(!result.confirmed);
        assert_eq!(backend.calls("conversation_history"), 0);
    }

    #[tokio::test]
    async fn test_dropped_signal_falls_back_to_polling() {
        let (committer, backend) = committer(
            MockBackend::new()
                .with_indexing_agent(Visibility::Immediate)
                .with_push_signal(PushSignal::Dropped),
        );

        let result = committer.commit(&turn()).await.unwrap();
        assert!(result.confirmed);
        assert_eq!(backend.calls("conversation_history"), 1);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(CommitPhase::TimedOut.to_string(), "timed out");
        assert_eq!(CommitPhase::Settling.to_string(), "settling");
    }
}
