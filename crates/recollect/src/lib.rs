//! Recollect - Long-term memory context for conversational assistants
//!
//! This crate assembles a narrative of remembered facts for each user query
//! from a memory backend, and commits new conversation turns back to it with
//! bounded visibility confirmation.

pub mod backend;
pub mod config;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod prompt;
pub mod storage;
pub mod testing;

pub use error::RecollectError;
pub use pipeline::{MemoryPipeline, PendingCommit};
