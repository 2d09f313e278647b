use crate::types::{AgentConfig, AgentState, AgentStatus, ResourceStats, TaskState};
use parking_lot::RwLock;
use std::sync::Arc;

struct AgentInner {
    id: String,
    config: AgentConfig,
    status: RwLock<AgentStatus>,
}

/// Handle to a live agent. Cheap to clone; all clones share one status.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    pub(crate) fn new(id: String, mut config: AgentConfig) -> Self {
        config.id = Some(id.clone());
        let status = AgentStatus {
            id: id.clone(),
            state: AgentState::Initialized,
            current_task: None,
            resources: ResourceStats::default(),
        };
        Self {
            inner: Arc::new(AgentInner {
                id,
                config,
                status: RwLock::new(status),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Configuration the agent was created from, with its assigned ID.
    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> AgentStatus {
        self.inner.status.read().clone()
    }

    pub fn state(&self) -> AgentState {
        self.inner.status.read().state
    }

    pub(crate) fn set_state(&self, state: AgentState) {
        self.inner.status.write().state = state;
    }

    /// Mark a task as current. A paused agent stays `paused`.
    pub(crate) fn begin_task(&self, task_id: &str) {
        let mut status = self.inner.status.write();
        status.current_task = Some(task_id.to_string());
        if !matches!(status.state, AgentState::Paused | AgentState::Stopped) {
            status.state = AgentState::Working;
        }
    }

    /// Clear the current task and fold its final state into the counters.
    pub(crate) fn finish_task(&self, outcome: TaskState, latency_ms: u64, tokens: u64) {
        let mut status = self.inner.status.write();
        status.current_task = None;
        if status.state == AgentState::Working {
            status.state = AgentState::Idle;
        }
        let resources = &mut status.resources;
        match outcome {
            TaskState::Completed => resources.tasks_completed += 1,
            TaskState::Failed => resources.tasks_failed += 1,
            _ => {}
        }
        resources.tokens_used += tokens;
        resources.last_latency_ms = latency_ms;
    }

    pub(crate) fn record_tool_call(&self) {
        self.inner.status.write().resources.tool_calls += 1;
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("state", &self.state())
            .finish()
    }
}
