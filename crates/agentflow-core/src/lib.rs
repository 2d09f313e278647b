//! Core types and error definitions for the agentflow runtime.
//!
//! This crate provides the foundational types shared across all agentflow crates:
//! the error taxonomy, the heterogeneous parameter map, chat messages consumed by
//! LLM providers, and the task-scoped [`ExecutionContext`].
//!
//! # Main types
//!
//! - [`AgentflowError`]: Unified error enum for the engine and its collaborators.
//! - [`AgentflowResult`]: Convenience alias for `Result<T, AgentflowError>`.
//! - [`Params`]: Named, heterogeneous parameters passed to tasks and tools.
//! - [`Role`] / [`Message`]: Chat messages exchanged with an LLM provider.
//! - [`ExecutionContext`]: Cancellation and deadline scope for one task.

/// Task-scoped cancellation and deadline propagation.
pub mod context;

pub use context::ExecutionContext;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for agentflow.
///
/// The first group of variants is the engine's public taxonomy; the second group
/// is raised by collaborators and usually surfaces wrapped in a failed task.
#[derive(Debug, thiserror::Error)]
pub enum AgentflowError {
    /// No live agent is registered under the given ID.
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// No task status record exists for the given ID.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// An agent or runtime configuration was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A tool reference could not be resolved by the tool executor.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// The agent's bounded task queue rejected a non-blocking enqueue.
    #[error("task queue is full for agent {agent_id} (capacity {capacity})")]
    QueueFull {
        /// Agent whose queue was full.
        agent_id: String,
        /// Configured queue capacity.
        capacity: usize,
    },

    /// No handler exists for the task's type discriminator.
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    /// A handler's required parameter was absent or had the wrong shape.
    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    /// A handler or collaborator failed while executing a task.
    #[error("task execution failed: {0}")]
    TaskExecutionFailed(String),

    /// A tool rejected its parameters during validation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Memory store failure.
    #[error("memory error: {0}")]
    Memory(String),

    /// Knowledge base failure.
    #[error("knowledge error: {0}")]
    Knowledge(String),

    /// LLM provider failure.
    #[error("llm error: {0}")]
    Llm(String),

    /// Outbound HTTP failure.
    #[error("http error: {0}")]
    Http(String),

    /// The execution context was cancelled.
    #[error("task cancelled")]
    Cancelled,

    /// The execution context's deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Configuration file loading or parsing failure.
    #[error("config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentflowError {
    /// Stable snake_case code naming the variant, recorded on failed tasks.
    pub fn code(&self) -> &'static str {
        match self {
            AgentflowError::AgentNotFound(_) => "agent_not_found",
            AgentflowError::TaskNotFound(_) => "task_not_found",
            AgentflowError::InvalidConfig(_) => "invalid_config",
            AgentflowError::ToolNotFound(_) => "tool_not_found",
            AgentflowError::QueueFull { .. } => "queue_full",
            AgentflowError::UnknownTaskType(_) => "unknown_task_type",
            AgentflowError::MissingParameter(_) => "missing_parameter",
            AgentflowError::TaskExecutionFailed(_) => "task_execution_failed",
            AgentflowError::InvalidParameter(_) => "invalid_parameter",
            AgentflowError::Memory(_) => "memory",
            AgentflowError::Knowledge(_) => "knowledge",
            AgentflowError::Llm(_) => "llm",
            AgentflowError::Http(_) => "http",
            AgentflowError::Cancelled => "cancelled",
            AgentflowError::DeadlineExceeded => "deadline_exceeded",
            AgentflowError::Config(_) => "config",
            AgentflowError::Json(_) => "json",
            AgentflowError::Io(_) => "io",
        }
    }
}

/// A convenience `Result` alias using [`AgentflowError`].
pub type AgentflowResult<T> = Result<T, AgentflowError>;

/// Named, heterogeneous parameters attached to tasks and tool calls.
pub type Params = HashMap<String, serde_json::Value>;

/// Generates a fresh opaque identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// --- Message types ---

/// The role of the participant that authored a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user or the task input.
    User,
    /// The model.
    Assistant,
    /// A system-level instruction.
    System,
    /// Output produced by a tool invocation.
    Tool,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// A single chat message exchanged with an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    pub role: Role,
    /// The textual content of the message.
    pub content: String,
    /// Optional participant name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// UTC timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a new message with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            timestamp: Utc::now(),
        }
    }

    /// Creates a new message with [`Role::User`].
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a new message with [`Role::Assistant`].
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates a new message with [`Role::System`].
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}
