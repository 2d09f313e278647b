//! Knowledge base and scoped knowledge contexts for agentflow agents.
//!
//! An agent gets one [`KnowledgeContext`] from the shared [`KnowledgeBase`] when
//! it is created. The context applies the agent's configured filters to every
//! query and search, and tags what the agent adds with the context's ID.
//!
//! # Main types
//!
//! - [`Knowledge`]: A typed item with JSON content, metadata and an embedding.
//! - [`KnowledgeBase`]: Trait for CRUD, structured query and semantic search.
//! - [`InMemoryKnowledgeBase`]: Reference implementation over a [`VectorIndex`].
//! - [`KnowledgeContext`]: Filtered view handed to an agent.
//! - [`EmbeddingProvider`] / [`HashEmbedding`]: Text to vector.

/// Knowledge base trait and in-memory implementation.
pub mod base;
/// Scoped knowledge contexts.
pub mod context;
/// Embedding provider trait and hashed bag-of-words implementation.
pub mod embedding;
/// Knowledge items, queries and configuration.
pub mod types;
/// In-memory cosine similarity index.
pub mod vector;

pub use base::{InMemoryKnowledgeBase, KnowledgeBase};
pub use context::{FilteredContext, KnowledgeContext, CONTEXT_ID_KEY};
pub use embedding::{EmbeddingProvider, HashEmbedding};
pub use types::{
    Knowledge, KnowledgeConfig, KnowledgeQuery, SortField, DEFAULT_QUERY_LIMIT,
    SIMILARITY_SCORE_KEY,
};
pub use vector::{cosine_similarity, VectorIndex};
