//! LLM provider abstraction for agentflow agents.
//!
//! Conversation tasks reach a model through [`LlmProvider`]. Providers are
//! registered by name in an [`LlmService`]; an agent's `ModelConfig` names the
//! provider and model to use.
//!
//! # Main types
//!
//! - [`LlmProvider`]: Trait for completion and chat backends.
//! - [`LlmService`]: Registry routing requests to providers by name.
//! - [`OllamaProvider`]: HTTP backend for a local Ollama server.
//! - [`EchoProvider`]: Deterministic offline backend.

/// Offline echo backend.
pub mod echo;
/// Ollama HTTP backend.
pub mod ollama;
/// Provider trait.
pub mod provider;
/// Provider registry.
pub mod service;
/// Request and response types.
pub mod types;

pub use echo::EchoProvider;
pub use ollama::{OllamaConfig, OllamaProvider, DEFAULT_OLLAMA_URL};
pub use provider::LlmProvider;
pub use service::LlmService;
pub use types::{ChatRequest, ChatResponse, CompletionRequest, CompletionResponse, ModelInfo, Usage};
