use crate::store::{InMemoryStore, MemoryStore};
use crate::types::MemoryConfig;
use agentflow_core::{new_id, AgentflowError, AgentflowResult, ExecutionContext};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Creates and tracks memory stores. The orchestrator asks it for one store per
/// agent.
#[async_trait]
pub trait MemoryManager: Send + Sync {
    async fn create_store(
        &self,
        ctx: &ExecutionContext,
        config: &MemoryConfig,
    ) -> AgentflowResult<Arc<dyn MemoryStore>>;

    async fn get_store(&self, ctx: &ExecutionContext, store_id: &str) -> AgentflowResult<Arc<dyn MemoryStore>>;

    async fn delete_store(&self, ctx: &ExecutionContext, store_id: &str) -> AgentflowResult<()>;

    async fn list_stores(&self, ctx: &ExecutionContext) -> AgentflowResult<Vec<String>>;
}

/// Manager handing out [`InMemoryStore`]s. Supports store types `"default"` and `""`.
#[derive(Default)]
pub struct InMemoryMemoryManager {
    stores: RwLock<HashMap<String, Arc<dyn MemoryStore>>>,
}

impl InMemoryMemoryManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryManager for InMemoryMemoryManager {
    async fn create_store(
        &self,
        ctx: &ExecutionContext,
        config: &MemoryConfig,
    ) -> AgentflowResult<Arc<dyn MemoryStore>> {
        ctx.check()?;
        match config.store_type.as_str() {
            "" | "default" => {}
            other => {
                return Err(AgentflowError::InvalidConfig(format!(
                    "unsupported memory store type: {other}"
                )))
            }
        }

        let id = new_id();
        let store: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new(id.clone(), config.size));
        self.stores.write().insert(id.clone(), Arc::clone(&store));
        info!(store = %id, size = config.size, "Created memory store");
        Ok(store)
    }

    async fn get_store(&self, ctx: &ExecutionContext, store_id: &str) -> AgentflowResult<Arc<dyn MemoryStore>> {
        ctx.check()?;
        self.stores
            .read()
            .get(store_id)
            .cloned()
            .ok_or_else(|| AgentflowError::Memory(format!("memory store not found: {store_id}")))
    }

    async fn delete_store(&self, ctx: &ExecutionContext, store_id: &str) -> AgentflowResult<()> {
        ctx.check()?;
        if self.stores.write().remove(store_id).is_none() {
            return Err(AgentflowError::Memory(format!(
                "memory store not found: {store_id}"
            )));
        }
        info!(store = %store_id, "Deleted memory store");
        Ok(())
    }

    async fn list_stores(&self, ctx: &ExecutionContext) -> AgentflowResult<Vec<String>> {
        ctx.check()?;
        let mut ids: Vec<String> = self.stores.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
