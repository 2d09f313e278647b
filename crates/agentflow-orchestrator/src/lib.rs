//! Agent lifecycle and task scheduling for agentflow.
//!
//! An [`AgentManager`] owns every live agent. Creating an agent resolves its
//! tools and LLM provider, creates its memory store and knowledge context, and
//! starts a [`Runtime`] that serves the agent's bounded task queue. Tasks are
//! accepted without blocking and their progress is tracked in a shared
//! [`TaskTable`]; observers follow along through the agent's event channel.
//!
//! # Main types
//!
//! - [`AgentManager`]: Create, pause, resume and destroy agents; assign and cancel tasks.
//! - [`Collaborators`]: Tool, memory, knowledge and LLM services shared by all agents.
//! - [`Runtime`]: Per-agent queue, workers and task handlers.
//! - [`EventSubscription`]: Single-consumer stream of an agent's [`Event`]s.
//! - [`MemoryWriter`]: Background pool that records task traces in agent memory.
//!
//! # Example
//!
//! ```no_run
//! use agentflow_orchestrator::{AgentConfig, AgentManager, Collaborators, Task};
//!
//! # async fn demo() -> agentflow_core::AgentflowResult<()> {
//! let manager = AgentManager::new(Collaborators::in_memory()?);
//! let agent = manager.create_agent(AgentConfig::new("helper")).await?;
//! let task_id = manager.assign_task(
//!     agent.id(),
//!     Task::new("conversation").with_param("input", "hello"),
//! )?;
//! let status = manager.get_task_status(&task_id)?;
//! println!("{}: {}", status.id, status.state);
//! # Ok(())
//! # }
//! ```

/// Agent handle and status bookkeeping.
pub mod agent;
/// Per-agent event channels and the event bus.
pub mod events;
mod handlers;
/// Agent manager and collaborator wiring.
pub mod manager;
/// Background memory writes.
pub mod memory_writer;
/// Per-agent task runtime.
pub mod runtime;
/// Task status table.
pub mod tasks;
/// Configuration, status and task types.
pub mod types;

pub use agent::Agent;
pub use events::{Event, EventBus, EventChannel, EventKind, EventSubscription};
pub use manager::{AgentManager, Collaborators};
pub use memory_writer::{MemoryWriteFailure, MemoryWriter};
pub use runtime::Runtime;
pub use tasks::TaskTable;
pub use types::{
    AgentConfig, AgentState, AgentStatus, ModelConfig, ResourceStats, RuntimeConfig, Task,
    TaskFailure, TaskKind, TaskResult, TaskState, TaskStatus, ToolRef,
};
