use crate::context::{FilteredContext, KnowledgeContext};
use crate::embedding::{EmbeddingProvider, HashEmbedding};
use crate::types::{Knowledge, KnowledgeConfig, KnowledgeQuery, DEFAULT_QUERY_LIMIT, SIMILARITY_SCORE_KEY};
use crate::vector::VectorIndex;
use agentflow_core::{new_id, AgentflowError, AgentflowResult, ExecutionContext};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Trait for knowledge storage backends.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Insert an item, assigning an ID and computing the embedding when absent.
    /// Returns the item's ID.
    async fn add(&self, ctx: &ExecutionContext, item: Knowledge) -> AgentflowResult<String>;

    async fn update(&self, ctx: &ExecutionContext, id: &str, item: Knowledge) -> AgentflowResult<()>;

    async fn delete(&self, ctx: &ExecutionContext, id: &str) -> AgentflowResult<()>;

    async fn get(&self, ctx: &ExecutionContext, id: &str) -> AgentflowResult<Knowledge>;

    async fn query(&self, ctx: &ExecutionContext, query: &KnowledgeQuery) -> AgentflowResult<Vec<Knowledge>>;

    /// Nearest items to `text`, restricted to those whose metadata matches
    /// `filter`. Each result carries its score under `similarity_score`.
    async fn semantic_search_filtered(
        &self,
        ctx: &ExecutionContext,
        text: &str,
        limit: usize,
        filter: &HashMap<String, serde_json::Value>,
    ) -> AgentflowResult<Vec<Knowledge>>;

    async fn semantic_search(
        &self,
        ctx: &ExecutionContext,
        text: &str,
        limit: usize,
    ) -> AgentflowResult<Vec<Knowledge>> {
        self.semantic_search_filtered(ctx, text, limit, &HashMap::new())
            .await
    }

    /// Open a filtered view for one agent.
    async fn create_context(
        &self,
        ctx: &ExecutionContext,
        config: &KnowledgeConfig,
    ) -> AgentflowResult<Arc<dyn KnowledgeContext>>;
}

struct Inner {
    items: RwLock<HashMap<String, Knowledge>>,
    index: VectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    contexts: RwLock<HashMap<String, KnowledgeConfig>>,
}

/// Knowledge base held in memory. Cloning shares the same storage.
#[derive(Clone)]
pub struct InMemoryKnowledgeBase {
    inner: Arc<Inner>,
}

impl InMemoryKnowledgeBase {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let dimension = embedder.dimension();
        Self {
            inner: Arc::new(Inner {
                items: RwLock::new(HashMap::new()),
                index: VectorIndex::new(dimension),
                embedder,
                contexts: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.read().is_empty()
    }

    /// IDs of contexts created so far.
    pub fn context_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.contexts.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn prepare(&self, ctx: &ExecutionContext, item: &mut Knowledge) -> AgentflowResult<()> {
        if item.content.is_null() {
            return Err(AgentflowError::Knowledge(
                "invalid knowledge: content is empty".to_string(),
            ));
        }
        if item.vector.is_empty() {
            let text = item.text();
            item.vector = ctx.run(self.inner.embedder.embed(&text)).await?;
        }
        Ok(())
    }
}

impl Default for InMemoryKnowledgeBase {
    fn default() -> Self {
        Self::new(Arc::new(HashEmbedding::default()))
    }
}

#[async_trait]
impl KnowledgeBase for InMemoryKnowledgeBase {
    async fn add(&self, ctx: &ExecutionContext, mut item: Knowledge) -> AgentflowResult<String> {
        ctx.check()?;
        if item.id.is_empty() {
            item.id = new_id();
        }
        self.prepare(ctx, &mut item).await?;

        self.inner.index.add(&item.id, item.vector.clone())?;
        let id = item.id.clone();
        self.inner.items.write().insert(id.clone(), item);
        debug!(knowledge = %id, "Added knowledge");
        Ok(id)
    }

    async fn update(&self, ctx: &ExecutionContext, id: &str, mut item: Knowledge) -> AgentflowResult<()> {
        ctx.check()?;
        if !self.inner.items.read().contains_key(id) {
            return Err(AgentflowError::Knowledge(format!("knowledge not found: {id}")));
        }
        item.id = id.to_string();
        self.prepare(ctx, &mut item).await?;

        self.inner.index.update(id, item.vector.clone())?;
        self.inner.items.write().insert(id.to_string(), item);
        Ok(())
    }

    async fn delete(&self, ctx: &ExecutionContext, id: &str) -> AgentflowResult<()> {
        ctx.check()?;
        if self.inner.items.write().remove(id).is_none() {
            return Err(AgentflowError::Knowledge(format!("knowledge not found: {id}")));
        }
        self.inner.index.delete(id)
    }

    async fn get(&self, ctx: &ExecutionContext, id: &str) -> AgentflowResult<Knowledge> {
        ctx.check()?;
        self.inner
            .items
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| AgentflowError::Knowledge(format!("knowledge not found: {id}")))
    }

    async fn query(&self, ctx: &ExecutionContext, query: &KnowledgeQuery) -> AgentflowResult<Vec<Knowledge>> {
        ctx.check()?;
        let mut hits: Vec<Knowledge> = self
            .inner
            .items
            .read()
            .values()
            .filter(|k| query.matches(k))
            .cloned()
            .collect();
        query.sort(&mut hits);
        hits.truncate(query.effective_limit());
        Ok(hits)
    }

    async fn semantic_search_filtered(
        &self,
        ctx: &ExecutionContext,
        text: &str,
        limit: usize,
        filter: &HashMap<String, serde_json::Value>,
    ) -> AgentflowResult<Vec<Knowledge>> {
        ctx.check()?;
        let limit = if limit == 0 { DEFAULT_QUERY_LIMIT } else { limit };
        let query_vector = ctx.run(self.inner.embedder.embed(text)).await?;

        // Rank everything, then filter, so filtered searches still fill `limit`.
        let ranked = self.inner.index.search(&query_vector, self.inner.index.len())?;
        let items = self.inner.items.read();
        let results = ranked
            .into_iter()
            .filter_map(|(id, score)| {
                let item = items.get(&id)?;
                if !item.matches_filter(filter) {
                    return None;
                }
                let mut item = item.clone();
                item.metadata
                    .insert(SIMILARITY_SCORE_KEY.to_string(), serde_json::json!(score));
                Some(item)
            })
            .take(limit)
            .collect();
        Ok(results)
    }

    async fn create_context(
        &self,
        ctx: &ExecutionContext,
        config: &KnowledgeConfig,
    ) -> AgentflowResult<Arc<dyn KnowledgeContext>> {
        ctx.check()?;
        let id = new_id();
        self.inner.contexts.write().insert(id.clone(), config.clone());
        info!(context = %id, filters = config.filters.len(), "Created knowledge context");
        Ok(Arc::new(FilteredContext::new(
            id,
            config.clone(),
            Arc::new(self.clone()),
        )))
    }
}
