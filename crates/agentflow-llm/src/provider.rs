use crate::types::{ChatRequest, ChatResponse, CompletionRequest, CompletionResponse, ModelInfo};
use agentflow_core::{AgentflowError, AgentflowResult, ExecutionContext};
use async_trait::async_trait;

/// Trait for LLM backends.
///
/// Implementations must honour `ctx`: a cancelled context or an elapsed
/// deadline ends the call with [`AgentflowError::Cancelled`] or
/// [`AgentflowError::DeadlineExceeded`].
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Registry key, e.g. `"ollama"`.
    fn name(&self) -> &str;

    async fn list_models(&self, ctx: &ExecutionContext) -> AgentflowResult<Vec<ModelInfo>>;

    async fn get_model(&self, ctx: &ExecutionContext, model_id: &str) -> AgentflowResult<ModelInfo> {
        self.list_models(ctx)
            .await?
            .into_iter()
            .find(|m| m.id == model_id)
            .ok_or_else(|| AgentflowError::Llm(format!("model {model_id} not found")))
    }

    async fn complete(
        &self,
        ctx: &ExecutionContext,
        request: CompletionRequest,
    ) -> AgentflowResult<CompletionResponse>;

    async fn chat(&self, ctx: &ExecutionContext, request: ChatRequest) -> AgentflowResult<ChatResponse>;
}
