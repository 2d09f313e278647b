use crate::provider::LlmProvider;
use crate::types::{ChatRequest, ChatResponse, CompletionRequest, CompletionResponse, ModelInfo};
use agentflow_core::{AgentflowError, AgentflowResult, ExecutionContext};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Registry of LLM providers keyed by [`LlmProvider::name`].
#[derive(Default)]
pub struct LlmService {
    providers: RwLock<HashMap<String, Arc<dyn LlmProvider>>>,
}

impl LlmService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. A second provider with the same name is rejected.
    pub fn register(&self, provider: Arc<dyn LlmProvider>) -> AgentflowResult<()> {
        let name = provider.name().to_string();
        let mut providers = self.providers.write();
        if providers.contains_key(&name) {
            return Err(AgentflowError::InvalidConfig(format!(
                "llm provider already registered: {name}"
            )));
        }
        info!(provider = %name, "Registered LLM provider");
        providers.insert(name, provider);
        Ok(())
    }

    pub fn get(&self, name: &str) -> AgentflowResult<Arc<dyn LlmProvider>> {
        self.providers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AgentflowError::Llm(format!("llm provider not found: {name}")))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Models of every provider, keyed by provider name.
    pub async fn list_models(&self, ctx: &ExecutionContext) -> AgentflowResult<HashMap<String, Vec<ModelInfo>>> {
        let providers: Vec<Arc<dyn LlmProvider>> = self.providers.read().values().cloned().collect();
        let mut out = HashMap::new();
        for provider in providers {
            out.insert(provider.name().to_string(), provider.list_models(ctx).await?);
        }
        Ok(out)
    }

    pub async fn complete(
        &self,
        ctx: &ExecutionContext,
        provider: &str,
        request: CompletionRequest,
    ) -> AgentflowResult<CompletionResponse> {
        self.get(provider)?.complete(ctx, request).await
    }

    pub async fn chat(
        &self,
        ctx: &ExecutionContext,
        provider: &str,
        request: ChatRequest,
    ) -> AgentflowResult<ChatResponse> {
        self.get(provider)?.chat(ctx, request).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::echo::EchoProvider;

    #[test]
    fn test_register_and_get() {
        let service = LlmService::new();
        service.register(Arc::new(EchoProvider::new())).unwrap();
        assert_eq!(service.names(), vec!["echo"]);
        assert_eq!(service.get("echo").unwrap().name(), "echo");
        assert!(service.get("ollama").is_err());
    }

    #[test]
    fn test_duplicate_rejected() {
        let service = LlmService::new();
        service.register(Arc::new(EchoProvider::new())).unwrap();
        assert!(service.register(Arc::new(EchoProvider::new())).is_err());
    }

    #[tokio::test]
    async fn test_complete_routes_by_name() {
        let service = LlmService::new();
        service.register(Arc::new(EchoProvider::new())).unwrap();
        let ctx = ExecutionContext::background();
        let resp = service
            .complete(&ctx, "echo", CompletionRequest::new("", "ping"))
            .await
            .unwrap();
        assert!(resp.text.ends_with("ping"));

        let models = service.list_models(&ctx).await.unwrap();
        assert_eq!(models["echo"].len(), 1);
    }
}
