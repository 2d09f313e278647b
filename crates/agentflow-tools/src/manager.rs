use crate::registry::ToolRegistry;
use crate::tool::{Tool, ToolCategory, ToolMetadata};
use agentflow_core::{AgentflowError, AgentflowResult, ExecutionContext, Params};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Criteria for [`ToolManager::list`]. Empty fields match everything; a tool must
/// carry at least one of the listed categories and one of the listed tags.
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    pub categories: Vec<ToolCategory>,
    pub tags: Vec<String>,
    pub version: Option<String>,
}

impl ToolFilter {
    fn matches(&self, meta: &ToolMetadata) -> bool {
        if let Some(version) = &self.version {
            if &meta.version != version {
                return false;
            }
        }
        if !self.categories.is_empty()
            && !meta.categories.iter().any(|c| self.categories.contains(c))
        {
            return false;
        }
        if !self.tags.is_empty() && !meta.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }
        true
    }
}

#[derive(Default)]
struct Inner {
    tools: HashMap<String, Arc<dyn Tool>>,
    registry: ToolRegistry,
}

/// Central table of available tools. Shared between agents behind an `Arc`.
#[derive(Default)]
pub struct ToolManager {
    inner: RwLock<Inner>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Rejects empty id/name/version and duplicate IDs.
    pub fn register(&self, tool: Arc<dyn Tool>) -> AgentflowResult<()> {
        let meta = tool.metadata().clone();
        if meta.id.is_empty() || meta.name.is_empty() || meta.version.is_empty() {
            return Err(AgentflowError::InvalidParameter(
                "tool id, name and version must be non-empty".to_string(),
            ));
        }

        let mut inner = self.inner.write();
        if inner.tools.contains_key(&meta.id) {
            return Err(AgentflowError::InvalidParameter(format!(
                "tool already registered: {}",
                meta.id
            )));
        }
        info!(tool = %meta.id, version = %meta.version, "Registered tool");
        inner.tools.insert(meta.id.clone(), tool);
        inner.registry.insert(meta);
        Ok(())
    }

    pub fn unregister(&self, tool_id: &str) -> AgentflowResult<()> {
        let mut inner = self.inner.write();
        if inner.tools.remove(tool_id).is_none() {
            return Err(AgentflowError::ToolNotFound(tool_id.to_string()));
        }
        inner.registry.remove(tool_id);
        info!(tool = %tool_id, "Unregistered tool");
        Ok(())
    }

    /// Look a tool up by ID.
    pub fn resolve(&self, tool_id: &str) -> AgentflowResult<Arc<dyn Tool>> {
        self.inner
            .read()
            .tools
            .get(tool_id)
            .cloned()
            .ok_or_else(|| AgentflowError::ToolNotFound(tool_id.to_string()))
    }

    /// Tools matching `filter`, ordered by ID.
    pub fn list(&self, filter: &ToolFilter) -> Vec<Arc<dyn Tool>> {
        let inner = self.inner.read();
        let mut tools: Vec<Arc<dyn Tool>> = inner
            .tools
            .values()
            .filter(|t| filter.matches(t.metadata()))
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.id().cmp(b.id()));
        tools
    }

    pub fn find_by_category(&self, category: ToolCategory) -> Vec<String> {
        self.inner.read().registry.find_by_category(category)
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<String> {
        self.inner.read().registry.find_by_tag(tag)
    }

    pub fn tool_count(&self) -> usize {
        self.inner.read().tools.len()
    }

    /// Resolve, validate and execute a tool.
    pub async fn execute(
        &self,
        ctx: &ExecutionContext,
        tool_id: &str,
        params: Params,
    ) -> AgentflowResult<serde_json::Value> {
        let tool = self.resolve(tool_id)?;
        tool.validate(&params)?;
        debug!(tool = %tool_id, "Executing tool");
        tool.execute(ctx, params).await
    }
}
