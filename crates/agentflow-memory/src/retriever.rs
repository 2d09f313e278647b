use crate::store::MemoryStore;
use crate::types::{Memory, MemoryQuery, MemoryType, TimeRange};
use agentflow_core::{AgentflowResult, ExecutionContext};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shorthand queries over a [`MemoryStore`].
#[derive(Clone)]
pub struct MemoryRetriever {
    store: Arc<dyn MemoryStore>,
}

impl MemoryRetriever {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }

    pub async fn recent(&self, ctx: &ExecutionContext, limit: usize) -> AgentflowResult<Vec<Memory>> {
        self.store.recall(ctx, &MemoryQuery::recent(limit)).await
    }

    pub async fn by_context(
        &self,
        ctx: &ExecutionContext,
        key: &str,
        value: serde_json::Value,
        limit: usize,
    ) -> AgentflowResult<Vec<Memory>> {
        let mut query = MemoryQuery::recent(limit);
        query.context.insert(key.to_string(), value);
        self.store.recall(ctx, &query).await
    }

    pub async fn important(
        &self,
        ctx: &ExecutionContext,
        min_importance: f64,
        limit: usize,
    ) -> AgentflowResult<Vec<Memory>> {
        let query = MemoryQuery {
            min_importance,
            limit,
            ..Default::default()
        };
        self.store.recall(ctx, &query).await
    }

    pub async fn by_type(
        &self,
        ctx: &ExecutionContext,
        memory_type: MemoryType,
        limit: usize,
    ) -> AgentflowResult<Vec<Memory>> {
        let query = MemoryQuery {
            memory_type: Some(memory_type),
            limit,
            ..Default::default()
        };
        self.store.recall(ctx, &query).await
    }

    pub async fn between(
        &self,
        ctx: &ExecutionContext,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> AgentflowResult<Vec<Memory>> {
        let query = MemoryQuery {
            time_range: TimeRange::new(start, end),
            limit,
            ..Default::default()
        };
        self.store.recall(ctx, &query).await
    }
}
