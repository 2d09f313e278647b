use crate::provider::LlmProvider;
use crate::types::{ChatRequest, ChatResponse, CompletionRequest, CompletionResponse, ModelInfo, Usage};
use agentflow_core::{AgentflowError, AgentflowResult, ExecutionContext, Message, Role};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

const ECHO_MODEL: &str = "echo-1";

/// Offline provider that answers `This is a response to: <prompt>`.
///
/// Token usage counts whitespace-separated words. An optional artificial delay
/// makes deadline behaviour observable in tests.
#[derive(Debug, Clone, Default)]
pub struct EchoProvider {
    delay: Option<Duration>,
}

impl EchoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }

    fn reply(prompt: &str) -> String {
        format!("This is a response to: {prompt}")
    }

    async fn pause(&self, ctx: &ExecutionContext) -> AgentflowResult<()> {
        match self.delay {
            Some(delay) => {
                ctx.run(async {
                    tokio::time::sleep(delay).await;
                    Ok(())
                })
                .await
            }
            None => ctx.check(),
        }
    }
}

fn words(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

#[async_trait]
impl LlmProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn list_models(&self, ctx: &ExecutionContext) -> AgentflowResult<Vec<ModelInfo>> {
        ctx.check()?;
        Ok(vec![ModelInfo {
            id: ECHO_MODEL.to_string(),
            name: "Echo".to_string(),
            provider: self.name().to_string(),
            capabilities: vec!["chat".to_string(), "completion".to_string()],
            max_tokens: 4096,
            metadata: HashMap::new(),
        }])
    }

    async fn complete(
        &self,
        ctx: &ExecutionContext,
        request: CompletionRequest,
    ) -> AgentflowResult<CompletionResponse> {
        self.pause(ctx).await?;
        let text = Self::reply(&request.prompt);
        let usage = Usage::new(words(&request.prompt), words(&text));
        Ok(CompletionResponse {
            text,
            model: if request.model.is_empty() {
                ECHO_MODEL.to_string()
            } else {
                request.model
            },
            usage,
            metadata: HashMap::new(),
        })
    }

    async fn chat(&self, ctx: &ExecutionContext, request: ChatRequest) -> AgentflowResult<ChatResponse> {
        self.pause(ctx).await?;
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .ok_or_else(|| AgentflowError::Llm("chat request has no user message".to_string()))?;

        let text = Self::reply(&last_user.content);
        let prompt_tokens = request.messages.iter().map(|m| words(&m.content)).sum();
        let usage = Usage::new(prompt_tokens, words(&text));
        Ok(ChatResponse {
            message: Message::assistant(text),
            model: if request.model.is_empty() {
                ECHO_MODEL.to_string()
            } else {
                request.model
            },
            usage,
        })
    }
}
