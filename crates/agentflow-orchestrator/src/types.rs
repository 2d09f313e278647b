use agentflow_core::{AgentflowError, AgentflowResult, Params};
use agentflow_knowledge::KnowledgeConfig;
use agentflow_memory::MemoryConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- Agent configuration ---

/// Which LLM provider and model an agent talks to.
///
/// An empty `provider` means the agent has no model and conversation tasks
/// answer with a canned reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_provider() -> String {
    "echo".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: String::new(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Reference to a registered tool, with per-agent settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolRef {
    pub id: String,
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

impl ToolRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config: HashMap::new(),
        }
    }
}

/// Immutable configuration an agent is created from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Assigned by the manager when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub tools: Vec<ToolRef>,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tool(mut self, id: impl Into<String>) -> Self {
        self.tools.push(ToolRef::new(id));
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    pub fn with_knowledge(mut self, knowledge: KnowledgeConfig) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    pub(crate) fn validate(&self) -> AgentflowResult<()> {
        if self.name.trim().is_empty() {
            return Err(AgentflowError::InvalidConfig(
                "agent name must not be empty".to_string(),
            ));
        }
        if let Some(tool) = self.tools.iter().find(|t| t.id.trim().is_empty()) {
            return Err(AgentflowError::InvalidConfig(format!(
                "tool reference with empty id (config: {:?})",
                tool.config
            )));
        }
        Ok(())
    }
}

// --- Agent status ---

/// Lifecycle state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Initialized,
    Ready,
    Running,
    Working,
    Idle,
    Paused,
    Stopped,
    Error,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Initialized => "initialized",
            AgentState::Ready => "ready",
            AgentState::Running => "running",
            AgentState::Working => "working",
            AgentState::Idle => "idle",
            AgentState::Paused => "paused",
            AgentState::Stopped => "stopped",
            AgentState::Error => "error",
        }
    }

    /// `stopped` and `error` end an agent's life.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Stopped | AgentState::Error)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-agent execution counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tool_calls: u64,
    pub tokens_used: u64,
    pub last_latency_ms: u64,
}

/// Snapshot of an agent's mutable status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub id: String,
    pub state: AgentState,
    pub current_task: Option<String>,
    pub resources: ResourceStats,
}

// --- Tasks ---

/// A unit of work submitted to an agent. Never mutated after enqueue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Task {
    /// Assigned by the manager when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Params,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn kind(&self) -> TaskKind {
        TaskKind::parse(&self.task_type)
    }
}

/// Handler selector parsed from [`Task::task_type`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Conversation,
    Research,
    Analysis,
    Unknown(String),
}

impl TaskKind {
    pub fn parse(task_type: &str) -> Self {
        match task_type {
            "conversation" => TaskKind::Conversation,
            "research" => TaskKind::Research,
            "analysis" => TaskKind::Analysis,
            other => TaskKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskKind::Conversation => "conversation",
            TaskKind::Research => "research",
            TaskKind::Analysis => "analysis",
            TaskKind::Unknown(other) => other,
        }
    }
}

/// Task lifecycle state.
///
/// ```text
/// pending -> running -> completed | failed
/// pending | running -> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Pending, TaskState::Cancelled)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Failed)
                | (TaskState::Running, TaskState::Cancelled)
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a successful task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    pub fn new(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            data,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `tokens_used` from the metadata, zero when absent.
    pub fn tokens_used(&self) -> u64 {
        self.metadata
            .get("tokens_used")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0)
    }
}

/// Why a task failed: the error's stable code plus its message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub code: String,
    pub message: String,
}

impl From<&AgentflowError> for TaskFailure {
    fn from(err: &AgentflowError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Observable status of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: String,
    pub agent_id: String,
    pub state: TaskState,
    /// In `[0, 1]`.
    pub progress: f32,
    /// Only set when `completed`.
    pub result: Option<TaskResult>,
    /// Only set when `failed`.
    pub error: Option<TaskFailure>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TaskStatus {
    pub fn pending(id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            state: TaskState::Pending,
            progress: 0.0,
            result: None,
            error: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }
}

// --- Runtime configuration ---

/// Tunables for the engine. Every field has a serde default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Bounded task queue per agent.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Worker tasks per agent.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Bounded event channel per agent.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_memory_writer_workers")]
    pub memory_writer_workers: usize,
    #[serde(default = "default_memory_writer_capacity")]
    pub memory_writer_capacity: usize,
    /// How long `destroy_agent` waits for in-flight work.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    10
}
fn default_max_concurrent() -> usize {
    1
}
fn default_event_capacity() -> usize {
    100
}
fn default_memory_writer_workers() -> usize {
    2
}
fn default_memory_writer_capacity() -> usize {
    64
}
fn default_shutdown_timeout_ms() -> u64 {
    5000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_concurrent: default_max_concurrent(),
            event_capacity: default_event_capacity(),
            memory_writer_workers: default_memory_writer_workers(),
            memory_writer_capacity: default_memory_writer_capacity(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> AgentflowResult<()> {
        let checks = [
            ("queue_capacity", self.queue_capacity),
            ("max_concurrent", self.max_concurrent),
            ("event_capacity", self.event_capacity),
            ("memory_writer_workers", self.memory_writer_workers),
            ("memory_writer_capacity", self.memory_writer_capacity),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(AgentflowError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.shutdown_timeout_ms)
    }
}
