use crate::agent::Agent;
use crate::events::{EventBus, EventChannel, EventKind, EventSubscription};
use crate::memory_writer::{MemoryWriteFailure, MemoryWriter};
use crate::runtime::{Runtime, RuntimeParts};
use crate::tasks::TaskTable;
use crate::types::{AgentConfig, AgentState, AgentStatus, RuntimeConfig, Task, TaskStatus};
use agentflow_core::{new_id, AgentflowError, AgentflowResult, ExecutionContext};
use agentflow_knowledge::{InMemoryKnowledgeBase, KnowledgeBase};
use agentflow_llm::{EchoProvider, LlmProvider, LlmService};
use agentflow_memory::{InMemoryMemoryManager, MemoryManager};
use agentflow_tools::{register_builtins, Tool, ToolManager};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The collaborators every agent draws from.
#[derive(Clone)]
pub struct Collaborators {
    /// Tools agents may reference by ID.
    pub tools: Arc<ToolManager>,
    /// Creates one memory store per agent.
    pub memory: Arc<dyn MemoryManager>,
    /// Creates one knowledge context per agent.
    pub knowledge: Arc<dyn KnowledgeBase>,
    /// LLM providers, selected by `ModelConfig::provider`.
    pub llm: Arc<LlmService>,
}

impl Collaborators {
    /// In-process collaborators: built-in tools, in-memory stores and the echo
    /// LLM provider.
    pub fn in_memory() -> AgentflowResult<Self> {
        let tools = ToolManager::new();
        register_builtins(&tools)?;
        let llm = LlmService::new();
        llm.register(Arc::new(EchoProvider::new()))?;
        Ok(Self {
            tools: Arc::new(tools),
            memory: Arc::new(InMemoryMemoryManager::new()),
            knowledge: Arc::new(InMemoryKnowledgeBase::default()),
            llm: Arc::new(llm),
        })
    }
}

struct AgentEntry {
    agent: Agent,
    runtime: Arc<Runtime>,
}

/// Creates and destroys agents, routes tasks to their runtimes and exposes
/// task status, agent status and per-agent event streams.
///
/// Construct inside a Tokio runtime: the background memory writer is spawned
/// immediately.
pub struct AgentManager {
    config: RuntimeConfig,
    collaborators: Collaborators,
    agents: RwLock<HashMap<String, AgentEntry>>,
    tasks: Arc<TaskTable>,
    events: EventBus,
    memory_writer: Arc<MemoryWriter>,
    shutdown: CancellationToken,
}

impl AgentManager {
    /// Manager with the default [`RuntimeConfig`].
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; use [`Self::with_config`]
    /// to get an error instead.
    pub fn new(collaborators: Collaborators) -> Self {
        Self::build(RuntimeConfig::default(), collaborators)
    }

    /// Fails with `InvalidConfig` for an invalid `config` or when no Tokio
    /// runtime is running.
    pub fn with_config(config: RuntimeConfig, collaborators: Collaborators) -> AgentflowResult<Self> {
        config.validate()?;
        tokio::runtime::Handle::try_current().map_err(|_| {
            AgentflowError::InvalidConfig("agent manager requires a Tokio runtime".to_string())
        })?;
        Ok(Self::build(config, collaborators))
    }

    fn build(config: RuntimeConfig, collaborators: Collaborators) -> Self {
        let memory_writer =
            MemoryWriter::start(config.memory_writer_workers, config.memory_writer_capacity);
        Self {
            config,
            collaborators,
            agents: RwLock::new(HashMap::new()),
            tasks: Arc::new(TaskTable::new()),
            events: EventBus::new(),
            memory_writer,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    // --- Agent lifecycle ---

    /// Create, initialize and start an agent.
    ///
    /// Fails with `InvalidConfig` for an empty name or a duplicate ID,
    /// `ToolNotFound` for an unresolvable tool reference, and propagates
    /// memory and knowledge collaborator errors.
    pub async fn create_agent(&self, config: AgentConfig) -> AgentflowResult<Agent> {
        config.validate()?;
        let id = config
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_id);
        if self.agents.read().contains_key(&id) {
            return Err(AgentflowError::InvalidConfig(format!(
                "agent already exists: {id}"
            )));
        }

        let tools = config
            .tools
            .iter()
            .map(|r| self.collaborators.tools.resolve(&r.id))
            .collect::<AgentflowResult<Vec<Arc<dyn Tool>>>>()?;
        let llm = self.resolve_llm(&config)?;

        let ctx = ExecutionContext::background();
        let memory = self
            .collaborators
            .memory
            .create_store(&ctx, &config.memory)
            .await?;
        let knowledge = match self
            .collaborators
            .knowledge
            .create_context(&ctx, &config.knowledge)
            .await
        {
            Ok(knowledge) => knowledge,
            Err(e) => {
                self.release_store(memory.id()).await;
                return Err(e);
            }
        };

        let agent = Agent::new(id.clone(), config);
        let channel = EventChannel::new(id.clone(), self.config.event_capacity);
        let runtime = Runtime::new(RuntimeParts {
            agent: agent.clone(),
            tools,
            memory,
            knowledge,
            llm,
            events: Arc::clone(&channel),
            tasks: Arc::clone(&self.tasks),
            memory_writer: Arc::clone(&self.memory_writer),
            config: self.config.clone(),
            parent: self.shutdown.clone(),
        });
        runtime.initialize();

        let store_id = runtime.memory().id().to_string();
        let inserted = {
            let mut agents = self.agents.write();
            if agents.contains_key(&id) {
                false
            } else {
                runtime.start();
                agents.insert(
                    id.clone(),
                    AgentEntry {
                        agent: agent.clone(),
                        runtime,
                    },
                );
                true
            }
        };
        if !inserted {
            // Lost a race against a concurrent create with the same ID.
            self.release_store(&store_id).await;
            return Err(AgentflowError::InvalidConfig(format!(
                "agent already exists: {id}"
            )));
        }
        self.events.register(channel);
        self.events.emit(
            &id,
            EventKind::AgentCreated,
            json!({ "agent_id": id, "name": agent.name() }),
        );
        info!(agent_id = %id, name = %agent.name(), "Agent created");
        Ok(agent)
    }

    fn resolve_llm(&self, config: &AgentConfig) -> AgentflowResult<Option<Arc<dyn LlmProvider>>> {
        let provider = config.model.provider.as_str();
        if provider.is_empty() {
            return Ok(None);
        }
        self.collaborators
            .llm
            .get(provider)
            .map(Some)
            .map_err(|_| AgentflowError::InvalidConfig(format!("unknown llm provider: {provider}")))
    }

    async fn release_store(&self, store_id: &str) {
        let ctx = ExecutionContext::background();
        if let Err(e) = self.collaborators.memory.delete_store(&ctx, store_id).await {
            warn!(store = %store_id, error = %e, "Failed to release memory store");
        }
    }

    /// Stop an agent and forget it. A second call returns `AgentNotFound`.
    pub async fn destroy_agent(&self, agent_id: &str) -> AgentflowResult<()> {
        let entry = self
            .agents
            .write()
            .remove(agent_id)
            .ok_or_else(|| AgentflowError::AgentNotFound(agent_id.to_string()))?;

        entry.runtime.stop(self.config.shutdown_timeout()).await;
        entry.agent.set_state(AgentState::Stopped);
        self.events
            .emit(agent_id, EventKind::AgentStopped, json!({ "agent_id": agent_id }));
        self.events.close(agent_id);
        self.release_store(entry.runtime.memory().id()).await;
        info!(agent_id = %agent_id, "Agent destroyed");
        Ok(())
    }

    /// Mark an agent paused. Queued and in-flight tasks are unaffected.
    pub fn pause_agent(&self, agent_id: &str) -> AgentflowResult<()> {
        let agent = self.agent(agent_id)?;
        agent.set_state(AgentState::Paused);
        self.events
            .emit(agent_id, EventKind::AgentPaused, json!({ "agent_id": agent_id }));
        info!(agent_id = %agent_id, "Agent paused");
        Ok(())
    }

    pub fn resume_agent(&self, agent_id: &str) -> AgentflowResult<()> {
        let agent = self.agent(agent_id)?;
        agent.set_state(AgentState::Running);
        self.events
            .emit(agent_id, EventKind::AgentResumed, json!({ "agent_id": agent_id }));
        info!(agent_id = %agent_id, "Agent resumed");
        Ok(())
    }

    // --- Tasks ---

    /// Record a task as pending and enqueue it without blocking. Returns the
    /// task ID. A rejected enqueue leaves no status record behind.
    pub fn assign_task(&self, agent_id: &str, task: Task) -> AgentflowResult<String> {
        let runtime = self
            .agents
            .read()
            .get(agent_id)
            .map(|e| Arc::clone(&e.runtime))
            .ok_or_else(|| AgentflowError::AgentNotFound(agent_id.to_string()))?;

        let task_id = task
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_id);
        self.tasks.insert_pending(&task_id, agent_id)?;

        if let Err(e) = runtime.enqueue(task_id.clone(), task) {
            self.tasks.remove(&task_id);
            warn!(agent_id = %agent_id, task_id = %task_id, error = %e, "Task rejected");
            return Err(e);
        }
        Ok(task_id)
    }

    /// Cancel a pending or running task. Cancelling a finished task is a no-op.
    pub fn cancel_task(&self, task_id: &str) -> AgentflowResult<()> {
        if let Some(agent_id) = self.tasks.cancel(task_id)? {
            self.events.emit(
                &agent_id,
                EventKind::TaskCancelled,
                json!({ "task_id": task_id }),
            );
            info!(agent_id = %agent_id, task_id = %task_id, "Task cancelled");
        }
        Ok(())
    }

    pub fn get_task_status(&self, task_id: &str) -> AgentflowResult<TaskStatus> {
        self.tasks
            .get(task_id)
            .ok_or_else(|| AgentflowError::TaskNotFound(task_id.to_string()))
    }

    /// Tasks of an agent, oldest first. Works for destroyed agents too.
    pub fn list_tasks(&self, agent_id: &str) -> Vec<TaskStatus> {
        self.tasks.list_for_agent(agent_id)
    }

    // --- Status and events ---

    pub fn get_agent_status(&self, agent_id: &str) -> AgentflowResult<AgentStatus> {
        Ok(self.agent(agent_id)?.status())
    }

    pub fn get_agent(&self, agent_id: &str) -> AgentflowResult<Agent> {
        self.agent(agent_id)
    }

    /// Status of every live agent, sorted by ID.
    pub fn list_agents(&self) -> Vec<AgentStatus> {
        let mut agents: Vec<AgentStatus> = self
            .agents
            .read()
            .values()
            .map(|e| e.agent.status())
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    /// Receive side of the agent's event channel. One subscriber at a time.
    pub fn subscribe_to_events(&self, agent_id: &str) -> AgentflowResult<EventSubscription> {
        self.events.subscribe(agent_id)
    }

    /// Events dropped because the agent's channel was full.
    pub fn dropped_events(&self, agent_id: &str) -> AgentflowResult<u64> {
        self.events.dropped(agent_id)
    }

    /// Background memory writes that failed since the last call.
    pub fn memory_write_failures(&self) -> Vec<MemoryWriteFailure> {
        self.memory_writer.take_failures()
    }

    /// Destroy every agent and drain the memory writer.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.agents.read().keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.destroy_agent(&id).await {
                warn!(agent_id = %id, error = %e, "Destroy during shutdown failed");
            }
        }
        self.memory_writer
            .shutdown(self.config.shutdown_timeout())
            .await;
        self.shutdown.cancel();
        info!("Agent manager shut down");
    }

    fn agent(&self, agent_id: &str) -> AgentflowResult<Agent> {
        self.agents
            .read()
            .get(agent_id)
            .map(|e| e.agent.clone())
            .ok_or_else(|| AgentflowError::AgentNotFound(agent_id.to_string()))
    }
}

impl Drop for AgentManager {
    fn drop(&mut self) {
        for entry in self.agents.read().values() {
            entry.runtime.close_queue();
        }
        self.shutdown.cancel();
    }
}
