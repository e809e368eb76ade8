//! Memory types and operations
//!
//! Defines the memory value types and the pipeline stages that gather,
//! merge and narrate memories, and commit new conversation turns.

pub mod commit;
pub mod extract;
pub mod merge;
pub mod narrative;
pub mod retrieval;
pub mod types;

pub use commit::{CommitPhase, ConversationCommitter};
pub use merge::{merge, render_numbered};
pub use narrative::NarrativeFormatter;
pub use retrieval::RetrievalAggregator;
pub use types::{
    ChatId, CommitResult, ConversationTurn, HistoryTurn, MemoryItem, MemoryMode, MemorySession,
    RawMemoryRecord, SourceTag,
};
