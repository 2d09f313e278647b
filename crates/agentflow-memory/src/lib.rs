//! Agent memory for the agentflow runtime.
//!
//! Each agent owns one memory store, created through a [`MemoryManager`] when
//! the agent is built. Task handlers recall recent memories before asking the
//! model, and tool calls leave short-term traces through the orchestrator's
//! background writer.
//!
//! # Main types
//!
//! - [`Memory`]: A typed, timestamped record with importance and context tags.
//! - [`MemoryStore`]: Trait for storing, recalling, forgetting and consolidating memories.
//! - [`InMemoryStore`]: Capacity-bounded store backed by a [`MemoryIndex`].
//! - [`MemoryManager`]: Creates and tracks stores per [`MemoryConfig`].
//! - [`MemoryRetriever`]: Convenience queries over any store.

/// Secondary indexes by type, context and time.
pub mod index;
/// Store manager trait and in-memory implementation.
pub mod manager;
/// Convenience query helpers.
pub mod retriever;
/// Store trait and in-memory implementation.
pub mod store;
/// Memory records, queries and filters.
pub mod types;

pub use index::MemoryIndex;
pub use manager::{InMemoryMemoryManager, MemoryManager};
pub use retriever::MemoryRetriever;
pub use store::{InMemoryStore, MemoryStore, DEFAULT_CAPACITY, PROMOTION_THRESHOLD};
pub use types::{
    Memory, MemoryConfig, MemoryFilter, MemoryQuery, MemoryStats, MemoryType, TimeRange,
    DEFAULT_RECALL_LIMIT,
};
