use crate::base::KnowledgeBase;
use crate::types::{Knowledge, KnowledgeConfig, KnowledgeQuery};
use agentflow_core::{AgentflowResult, ExecutionContext};
use async_trait::async_trait;
use std::sync::Arc;

/// Metadata key tagging items added through a context.
pub const CONTEXT_ID_KEY: &str = "context_id";

/// An agent's view of a knowledge base.
#[async_trait]
pub trait KnowledgeContext: Send + Sync {
    fn id(&self) -> &str;

    async fn query(&self, ctx: &ExecutionContext, query: &KnowledgeQuery) -> AgentflowResult<Vec<Knowledge>>;

    async fn semantic_search(
        &self,
        ctx: &ExecutionContext,
        text: &str,
        limit: usize,
    ) -> AgentflowResult<Vec<Knowledge>>;

    /// Add an item through this context. Returns the item's ID.
    async fn add_knowledge(&self, ctx: &ExecutionContext, item: Knowledge) -> AgentflowResult<String>;

    /// Items most relevant to `text`. Same as a semantic search by default.
    async fn relevant(
        &self,
        ctx: &ExecutionContext,
        text: &str,
        limit: usize,
    ) -> AgentflowResult<Vec<Knowledge>> {
        self.semantic_search(ctx, text, limit).await
    }
}

/// Context that applies its configured metadata filters to every read.
///
/// Items added through the context are tagged with `context_id` and receive any
/// filter entries they lack, so they stay visible to the context afterwards.
pub struct FilteredContext {
    id: String,
    config: KnowledgeConfig,
    base: Arc<dyn KnowledgeBase>,
}

impl FilteredContext {
    pub fn new(id: impl Into<String>, config: KnowledgeConfig, base: Arc<dyn KnowledgeBase>) -> Self {
        Self {
            id: id.into(),
            config,
            base,
        }
    }

    pub fn config(&self) -> &KnowledgeConfig {
        &self.config
    }
}

#[async_trait]
impl KnowledgeContext for FilteredContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn query(&self, ctx: &ExecutionContext, query: &KnowledgeQuery) -> AgentflowResult<Vec<Knowledge>> {
        let mut scoped = query.clone();
        for (key, value) in &self.config.filters {
            scoped
                .filter
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self.base.query(ctx, &scoped).await
    }

    async fn semantic_search(
        &self,
        ctx: &ExecutionContext,
        text: &str,
        limit: usize,
    ) -> AgentflowResult<Vec<Knowledge>> {
        self.base
            .semantic_search_filtered(ctx, text, limit, &self.config.filters)
            .await
    }

    async fn add_knowledge(&self, ctx: &ExecutionContext, mut item: Knowledge) -> AgentflowResult<String> {
        item.metadata
            .insert(CONTEXT_ID_KEY.to_string(), serde_json::json!(self.id));
        for (key, value) in &self.config.filters {
            item.metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self.base.add(ctx, item).await
    }
}
