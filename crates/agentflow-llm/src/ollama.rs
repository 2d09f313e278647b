use crate::provider::LlmProvider;
use crate::types::{ChatRequest, ChatResponse, CompletionRequest, CompletionResponse, ModelInfo, Usage};
use agentflow_core::{AgentflowError, AgentflowResult, ExecutionContext, Message, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Backend for the Ollama HTTP API. Requests are non-streaming.
pub struct OllamaProvider {
    config: OllamaConfig,
    http: reqwest::Client,
}

// --- Wire types ---

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified_at: Option<String>,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    options: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
    #[serde(default)]
    total_duration: Option<u64>,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    options: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatWireResponse {
    #[serde(default)]
    model: String,
    message: WireMessage,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

fn options(temperature: Option<f32>, max_tokens: Option<u32>, stop: &[String]) -> serde_json::Map<String, serde_json::Value> {
    let mut opts = serde_json::Map::new();
    if let Some(t) = temperature {
        opts.insert("temperature".to_string(), serde_json::json!(t));
    }
    if let Some(n) = max_tokens {
        opts.insert("num_predict".to_string(), serde_json::json!(n));
    }
    if !stop.is_empty() {
        opts.insert("stop".to_string(), serde_json::json!(stop));
    }
    opts
}

fn parse_role(role: &str) -> Role {
    match role {
        "user" => Role::User,
        "system" => Role::System,
        "tool" => Role::Tool,
        _ => Role::Assistant,
    }
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> AgentflowResult<Self> {
        let timeout = if config.timeout_secs == 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            config.timeout_secs
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| AgentflowError::Http(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> AgentflowResult<T> {
        let url = format!("{}{}", self.base_url(), path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentflowError::Http(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn post_json<B: Serialize + Sync, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> AgentflowResult<T> {
        let url = format!("{}{}", self.base_url(), path);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentflowError::Http(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> AgentflowResult<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentflowError::Llm(format!("Ollama API error {status}: {body}")));
        }
        resp.json::<T>()
            .await
            .map_err(|e| AgentflowError::Llm(format!("invalid Ollama response: {e}")))
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn list_models(&self, ctx: &ExecutionContext) -> AgentflowResult<Vec<ModelInfo>> {
        let tags: TagsResponse = ctx.run(self.get_json("/api/tags")).await?;
        Ok(tags
            .models
            .into_iter()
            .map(|m| {
                let mut metadata = HashMap::new();
                if let Some(size) = m.size {
                    metadata.insert("size".to_string(), serde_json::json!(size));
                }
                if let Some(modified) = m.modified_at {
                    metadata.insert("modified_at".to_string(), serde_json::json!(modified));
                }
                ModelInfo {
                    id: m.name.clone(),
                    name: m.name,
                    provider: "ollama".to_string(),
                    capabilities: vec!["chat".to_string(), "completion".to_string()],
                    max_tokens: DEFAULT_MAX_TOKENS,
                    metadata,
                }
            })
            .collect())
    }

    async fn complete(
        &self,
        ctx: &ExecutionContext,
        request: CompletionRequest,
    ) -> AgentflowResult<CompletionResponse> {
        if request.model.is_empty() {
            return Err(AgentflowError::Llm("model ID cannot be empty".to_string()));
        }
        let body = GenerateBody {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            options: options(request.temperature, request.max_tokens, &request.stop),
        };
        debug!(model = %request.model, "Ollama generate");
        let resp: GenerateResponse = ctx.run(self.post_json("/api/generate", &body)).await?;

        let mut metadata = HashMap::new();
        if let Some(ns) = resp.total_duration {
            metadata.insert("total_duration_ms".to_string(), serde_json::json!(ns / 1_000_000));
        }
        Ok(CompletionResponse {
            text: resp.response,
            model: if resp.model.is_empty() { request.model.clone() } else { resp.model },
            usage: Usage::new(resp.prompt_eval_count, resp.eval_count),
            metadata,
        })
    }

    async fn chat(&self, ctx: &ExecutionContext, request: ChatRequest) -> AgentflowResult<ChatResponse> {
        if request.model.is_empty() {
            return Err(AgentflowError::Llm("model ID cannot be empty".to_string()));
        }
        if request.messages.is_empty() {
            return Err(AgentflowError::Llm("messages cannot be empty".to_string()));
        }
        let body = ChatBody {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            stream: false,
            options: options(request.temperature, request.max_tokens, &[]),
        };
        debug!(model = %request.model, messages = request.messages.len(), "Ollama chat");
        let resp: ChatWireResponse = ctx.run(self.post_json("/api/chat", &body)).await?;

        Ok(ChatResponse {
            message: Message::new(parse_role(&resp.message.role), resp.message.content),
            model: if resp.model.is_empty() { request.model.clone() } else { resp.model },
            usage: Usage::new(resp.prompt_eval_count, resp.eval_count),
        })
    }
}
