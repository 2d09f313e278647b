use crate::index::MemoryIndex;
use crate::types::{Memory, MemoryFilter, MemoryQuery, MemoryStats, MemoryType};
use agentflow_core::{new_id, AgentflowError, AgentflowResult, ExecutionContext};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Capacity used when a store is created with size zero.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Short-term memories at or above this importance survive consolidation as
/// long-term memories.
pub const PROMOTION_THRESHOLD: f64 = 0.7;

/// Trait for memory storage backends.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Identifier assigned by the manager that created the store.
    fn id(&self) -> &str;

    /// Insert or replace a memory. An empty ID is replaced by a fresh one.
    async fn store(&self, ctx: &ExecutionContext, memory: Memory) -> AgentflowResult<()>;

    /// Memories matching `query`, newest first, at most the query's limit.
    async fn recall(&self, ctx: &ExecutionContext, query: &MemoryQuery) -> AgentflowResult<Vec<Memory>>;

    /// Delete every memory matching `filter`. Returns how many were removed.
    async fn forget(&self, ctx: &ExecutionContext, filter: &MemoryFilter) -> AgentflowResult<usize>;

    /// Promote important short-term memories and evict the oldest remaining
    /// short-term ones until the store is back under its target size.
    async fn consolidate(&self, ctx: &ExecutionContext) -> AgentflowResult<()>;

    async fn stats(&self, ctx: &ExecutionContext) -> AgentflowResult<MemoryStats>;
}

#[derive(Default)]
struct State {
    memories: HashMap<String, Memory>,
    index: MemoryIndex,
    stats: MemoryStats,
}

impl State {
    fn count(&mut self, memory_type: MemoryType, delta: isize) {
        let apply = |n: &mut usize| *n = n.saturating_add_signed(delta);
        apply(&mut self.stats.total_items);
        match memory_type {
            MemoryType::ShortTerm => apply(&mut self.stats.short_term),
            MemoryType::LongTerm => apply(&mut self.stats.long_term),
            MemoryType::Working => apply(&mut self.stats.working),
        }
    }

    fn insert(&mut self, memory: Memory) {
        if let Some(previous) = self.memories.remove(&memory.id) {
            self.index.remove(&previous);
            self.count(previous.memory_type, -1);
        }
        self.index.add(&memory);
        self.count(memory.memory_type, 1);
        self.memories.insert(memory.id.clone(), memory);
    }

    fn remove(&mut self, id: &str) -> Option<Memory> {
        let memory = self.memories.remove(id)?;
        self.index.remove(&memory);
        self.count(memory.memory_type, -1);
        Some(memory)
    }
}

/// In-memory store with a soft capacity.
///
/// When an insert pushes the store past its capacity, it consolidates down to
/// 80% of capacity: short-term memories with importance of at least
/// [`PROMOTION_THRESHOLD`] become long-term, then the oldest short-term
/// memories are evicted. Long-term and working memories are never evicted.
pub struct InMemoryStore {
    id: String,
    capacity: usize,
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new(id: impl Into<String>, capacity: usize) -> Self {
        Self {
            id: id.into(),
            capacity: if capacity == 0 { DEFAULT_CAPACITY } else { capacity },
            state: RwLock::new(State::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn target_size(&self) -> usize {
        (self.capacity * 4 / 5).max(1)
    }

    fn consolidate_locked(&self, state: &mut State) {
        let mut promoted = 0;
        let promote: Vec<Memory> = state
            .memories
            .values()
            .filter(|m| m.memory_type == MemoryType::ShortTerm && m.importance >= PROMOTION_THRESHOLD)
            .cloned()
            .collect();
        for mut memory in promote {
            memory.memory_type = MemoryType::LongTerm;
            state.insert(memory);
            promoted += 1;
        }
        state.stats.promoted += promoted;

        let target = self.target_size();
        if state.stats.total_items <= target {
            return;
        }

        let mut short_term: Vec<(chrono::DateTime<chrono::Utc>, String)> = state
            .memories
            .values()
            .filter(|m| m.memory_type == MemoryType::ShortTerm)
            .map(|m| (m.timestamp, m.id.clone()))
            .collect();
        short_term.sort();

        let excess = state.stats.total_items - target;
        let mut evicted = 0;
        for (_, id) in short_term.into_iter().take(excess) {
            if state.remove(&id).is_some() {
                evicted += 1;
            }
        }
        state.stats.evicted += evicted;

        debug!(
            store = %self.id,
            promoted,
            evicted,
            remaining = state.stats.total_items,
            "Consolidated memory store"
        );
    }
}

fn validate(memory: &Memory) -> AgentflowResult<()> {
    if memory.content.is_null() {
        return Err(AgentflowError::Memory("invalid memory: content is empty".to_string()));
    }
    if !(0.0..=1.0).contains(&memory.importance) {
        return Err(AgentflowError::Memory(format!(
            "invalid memory: importance {} outside [0, 1]",
            memory.importance
        )));
    }
    Ok(())
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn store(&self, ctx: &ExecutionContext, mut memory: Memory) -> AgentflowResult<()> {
        ctx.check()?;
        if memory.id.is_empty() {
            memory.id = new_id();
        }
        validate(&memory)?;

        let mut state = self.state.write().await;
        state.insert(memory);
        if state.stats.total_items > self.capacity {
            self.consolidate_locked(&mut state);
        }
        Ok(())
    }

    async fn recall(&self, ctx: &ExecutionContext, query: &MemoryQuery) -> AgentflowResult<Vec<Memory>> {
        ctx.check()?;
        let state = self.state.read().await;

        let mut hits: Vec<Memory> = match state.index.candidates(query.memory_type, &query.context) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| state.memories.get(id))
                .filter(|m| query.matches(m))
                .cloned()
                .collect(),
            None => state
                .memories
                .values()
                .filter(|m| query.matches(m))
                .cloned()
                .collect(),
        };

        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(query.effective_limit());
        Ok(hits)
    }

    async fn forget(&self, ctx: &ExecutionContext, filter: &MemoryFilter) -> AgentflowResult<usize> {
        ctx.check()?;
        let mut state = self.state.write().await;
        let doomed: Vec<String> = state
            .memories
            .values()
            .filter(|m| filter.matches(m))
            .map(|m| m.id.clone())
            .collect();
        let removed = doomed.iter().filter(|id| state.remove(id).is_some()).count();
        Ok(removed)
    }

    async fn consolidate(&self, ctx: &ExecutionContext) -> AgentflowResult<()> {
        ctx.check()?;
        let mut state = self.state.write().await;
        self.consolidate_locked(&mut state);
        Ok(())
    }

    async fn stats(&self, ctx: &ExecutionContext) -> AgentflowResult<MemoryStats> {
        ctx.check()?;
        Ok(self.state.read().await.stats)
    }
}
