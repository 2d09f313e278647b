use crate::agent::Agent;
use crate::events::{EventChannel, EventKind};
use crate::handlers;
use crate::memory_writer::MemoryWriter;
use crate::tasks::TaskTable;
use crate::types::{AgentState, RuntimeConfig, Task, TaskState};
use agentflow_core::{AgentflowError, AgentflowResult, ExecutionContext, Params};
use agentflow_knowledge::KnowledgeContext;
use agentflow_llm::LlmProvider;
use agentflow_memory::{Memory, MemoryStore};
use agentflow_tools::{Tool, ToolCategory};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Importance given to memories recorded by the runtime.
const RUNTIME_MEMORY_IMPORTANCE: f64 = 0.5;

/// How long stragglers get after their contexts are cancelled on shutdown.
const ABORT_GRACE: Duration = Duration::from_millis(250);

pub(crate) struct QueuedTask {
    pub id: String,
    pub task: Task,
}

/// Everything a runtime is built from.
pub(crate) struct RuntimeParts {
    pub agent: Agent,
    pub tools: Vec<Arc<dyn Tool>>,
    pub memory: Arc<dyn MemoryStore>,
    pub knowledge: Arc<dyn KnowledgeContext>,
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub events: Arc<EventChannel>,
    pub tasks: Arc<TaskTable>,
    pub memory_writer: Arc<MemoryWriter>,
    pub config: RuntimeConfig,
    pub parent: CancellationToken,
}

/// Per-agent execution environment: a bounded FIFO task queue served by
/// `max_concurrent` workers, plus the agent's resolved collaborators.
pub struct Runtime {
    agent: Agent,
    tools: Vec<Arc<dyn Tool>>,
    memory: Arc<dyn MemoryStore>,
    knowledge: Arc<dyn KnowledgeContext>,
    llm: Option<Arc<dyn LlmProvider>>,
    events: Arc<EventChannel>,
    tasks: Arc<TaskTable>,
    memory_writer: Arc<MemoryWriter>,
    config: RuntimeConfig,
    /// Held for a whole task, so an agent's handlers never overlap.
    execution: tokio::sync::Mutex<()>,
    queue_tx: Mutex<Option<mpsc::Sender<QueuedTask>>>,
    queue_rx: Mutex<Option<mpsc::Receiver<QueuedTask>>>,
    shutdown: CancellationToken,
    stopping: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Runtime {
    pub(crate) fn new(parts: RuntimeParts) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(parts.config.queue_capacity.max(1));
        let mut tools = parts.tools;
        tools.sort_by(|a, b| a.id().cmp(b.id()));
        Arc::new(Self {
            agent: parts.agent,
            tools,
            memory: parts.memory,
            knowledge: parts.knowledge,
            llm: parts.llm,
            events: parts.events,
            tasks: parts.tasks,
            memory_writer: parts.memory_writer,
            config: parts.config,
            execution: tokio::sync::Mutex::new(()),
            queue_tx: Mutex::new(Some(tx)),
            queue_rx: Mutex::new(Some(rx)),
            shutdown: parts.parent.child_token(),
            stopping: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    pub fn knowledge(&self) -> &Arc<dyn KnowledgeContext> {
        &self.knowledge
    }

    pub fn llm(&self) -> Option<&Arc<dyn LlmProvider>> {
        self.llm.as_ref()
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// First tool (by ID) in the given category.
    pub fn tool_in_category(&self, category: ToolCategory) -> Option<&Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|t| t.metadata().categories.contains(&category))
    }

    pub(crate) fn set_progress(&self, task_id: &str, progress: f32) {
        self.tasks.set_progress(task_id, progress);
    }

    /// `initialized -> ready`.
    pub(crate) fn initialize(&self) {
        self.agent.set_state(AgentState::Ready);
        self.events.emit(
            EventKind::AgentInitialized,
            json!({ "agent_id": self.agent.id() }),
        );
        debug!(agent_id = %self.agent.id(), "Agent initialized");
    }

    /// Spawn the workers. Calling it again is a no-op.
    pub(crate) fn start(self: &Arc<Self>) {
        let Some(rx) = self.queue_rx.lock().take() else {
            return;
        };
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut workers = self.workers.lock();
        for worker in 0..self.config.max_concurrent.max(1) {
            let runtime = Arc::clone(self);
            let rx = Arc::clone(&rx);
            workers.push(tokio::spawn(async move {
                runtime.worker_loop(rx, worker).await;
            }));
        }
        info!(
            agent_id = %self.agent.id(),
            workers = workers.len(),
            queue_capacity = self.config.queue_capacity,
            "Runtime started"
        );
    }

    /// Non-blocking enqueue. Publishes `task_assigned` once a queue slot is
    /// reserved, so the event always precedes the task's `task_started`.
    pub(crate) fn enqueue(&self, id: String, task: Task) -> AgentflowResult<()> {
        let tx = self.queue_tx.lock();
        let tx = tx.as_ref().ok_or_else(|| {
            AgentflowError::AgentNotFound(self.agent.id().to_string())
        })?;
        let permit = tx.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => AgentflowError::QueueFull {
                agent_id: self.agent.id().to_string(),
                capacity: self.config.queue_capacity,
            },
            TrySendError::Closed(()) => AgentflowError::AgentNotFound(self.agent.id().to_string()),
        })?;
        self.events.emit(
            EventKind::TaskAssigned,
            json!({ "task_id": id, "task_type": task.task_type }),
        );
        debug!(agent_id = %self.agent.id(), task_id = %id, "Task enqueued");
        permit.send(QueuedTask { id, task });
        Ok(())
    }

    /// Close the queue without waiting. Queued tasks are cancelled by the workers.
    pub(crate) fn close_queue(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.queue_tx.lock().take();
    }

    /// Stop the runtime: refuse new tasks, cancel queued ones, and wait up to
    /// `timeout` for the in-flight task. Stragglers have their contexts
    /// cancelled and are then aborted.
    pub(crate) async fn stop(&self, timeout: Duration) {
        self.close_queue();
        let mut handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());

        let drained = tokio::time::timeout(timeout, join_all(&mut handles))
            .await
            .is_ok();

        if !drained {
            warn!(agent_id = %self.agent.id(), "Runtime did not drain in time, cancelling in-flight work");
            self.shutdown.cancel();
            let _ = tokio::time::timeout(ABORT_GRACE, join_all(&mut handles)).await;
            for handle in &handles {
                handle.abort();
            }
        }

        for task_id in self.tasks.cancel_open_for_agent(self.agent.id()) {
            self.events.emit(
                EventKind::TaskCancelled,
                json!({ "task_id": task_id, "reason": "agent stopped" }),
            );
        }
        self.shutdown.cancel();
        info!(agent_id = %self.agent.id(), drained, "Runtime stopped");
    }

    async fn worker_loop(
        self: Arc<Self>,
        rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedTask>>>,
        worker: usize,
    ) {
        loop {
            let (job, permit) = {
                let mut queue = rx.lock().await;
                let Some(job) = queue.recv().await else { break };
                // Taken before the queue is released so handlers run in dequeue order.
                let permit = self.execution.lock().await;
                (job, permit)
            };
            self.process(job).await;
            drop(permit);
        }
        debug!(agent_id = %self.agent.id(), worker, "Worker exited");
    }

    async fn process(self: &Arc<Self>, job: QueuedTask) {
        let QueuedTask { id, task } = job;
        let agent_id = self.agent.id().to_string();

        if self.stopping.load(Ordering::SeqCst) {
            if let Ok(Some(_)) = self.tasks.cancel(&id) {
                self.events.emit(
                    EventKind::TaskCancelled,
                    json!({ "task_id": id, "reason": "agent stopped" }),
                );
            }
            return;
        }

        let ctx = ExecutionContext::for_task(&id, &agent_id, task.deadline, &self.shutdown);
        if !self.tasks.mark_running(&id, ctx.token()) {
            debug!(agent_id = %agent_id, task_id = %id, "Skipping task cancelled while queued");
            ctx.cancel();
            return;
        }

        self.events.emit(
            EventKind::TaskStarted,
            json!({ "task_id": id, "task_type": task.task_type }),
        );
        self.agent.begin_task(&id);
        info!(agent_id = %agent_id, task_id = %id, task_type = %task.task_type, "Task started");
        let started = Instant::now();

        let outcome = {
            let runtime = Arc::clone(self);
            let task_ctx = ctx.clone();
            let task_id = id.clone();
            let handle = tokio::spawn(async move {
                task_ctx
                    .run(handlers::dispatch(&runtime, &task_ctx, &task_id, &task))
                    .await
            });
            match handle.await {
                Ok(result) => result,
                Err(join) if join.is_panic() => Err(AgentflowError::TaskExecutionFailed(
                    "task handler panicked".to_string(),
                )),
                Err(_) => Err(AgentflowError::TaskExecutionFailed(
                    "task handler was aborted".to_string(),
                )),
            }
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let (final_state, tokens) = match outcome {
            Ok(result) => {
                let tokens = result.tokens_used();
                if self.tasks.mark_completed(&id, result) {
                    self.events
                        .emit(EventKind::TaskCompleted, json!({ "task_id": id }));
                    info!(agent_id = %agent_id, task_id = %id, latency_ms, "Task completed");
                    (TaskState::Completed, tokens)
                } else {
                    debug!(agent_id = %agent_id, task_id = %id, "Discarding result of cancelled task");
                    (TaskState::Cancelled, tokens)
                }
            }
            Err(err) => {
                let err = handlers::task_error(err);
                if self.tasks.mark_failed(&id, &err) {
                    self.events.emit(
                        EventKind::TaskFailed,
                        json!({ "task_id": id, "error": err.to_string(), "code": err.code() }),
                    );
                    warn!(agent_id = %agent_id, task_id = %id, error = %err, "Task failed");
                    (TaskState::Failed, 0)
                } else {
                    debug!(agent_id = %agent_id, task_id = %id, error = %err, "Discarding failure of cancelled task");
                    (TaskState::Cancelled, 0)
                }
            }
        };

        self.agent.finish_task(final_state, latency_ms, tokens);
        // Releases the deadline timer.
        ctx.cancel();
    }

    /// Invoke one of the agent's tools under the task context.
    ///
    /// Publishes `tool_call_started` and then `tool_call_completed` or
    /// `tool_call_failed`. A successful call is remembered as a short-term
    /// memory in the background; that write never affects the caller.
    pub async fn call_tool(
        &self,
        ctx: &ExecutionContext,
        tool_id: &str,
        params: Params,
    ) -> AgentflowResult<serde_json::Value> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.id() == tool_id)
            .ok_or_else(|| AgentflowError::ToolNotFound(tool_id.to_string()))?;
        tool.validate(&params)?;

        let task_id = ctx.task_id().unwrap_or_default().to_string();
        self.events.emit(
            EventKind::ToolCallStarted,
            json!({ "task_id": task_id, "tool_id": tool_id, "params": params }),
        );
        self.agent.record_tool_call();

        let started = Instant::now();
        let outcome = ctx.run(tool.execute(ctx, params.clone())).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                self.events.emit(
                    EventKind::ToolCallCompleted,
                    json!({ "task_id": task_id, "tool_id": tool_id, "duration_ms": duration_ms }),
                );
                self.remember(
                    &task_id,
                    "tool_call",
                    json!({ "tool_id": tool_id, "params": params, "result": result }),
                    Some(tool_id),
                );
                Ok(result)
            }
            Err(err) => {
                self.events.emit(
                    EventKind::ToolCallFailed,
                    json!({
                        "task_id": task_id,
                        "tool_id": tool_id,
                        "duration_ms": duration_ms,
                        "error": err.to_string(),
                    }),
                );
                Err(err)
            }
        }
    }

    /// Queue a short-term memory for the background writer.
    pub(crate) fn remember(
        &self,
        task_id: &str,
        kind: &str,
        content: serde_json::Value,
        tool_id: Option<&str>,
    ) {
        let mut memory = Memory::short_term(content, RUNTIME_MEMORY_IMPORTANCE)
            .with_context("agent_id", json!(self.agent.id()))
            .with_context("task_id", json!(task_id))
            .with_context("kind", json!(kind));
        if let Some(tool_id) = tool_id {
            memory = memory.with_context("tool_id", json!(tool_id));
        }
        self.memory_writer
            .submit(self.agent.id(), Arc::clone(&self.memory), memory);
    }
}

/// Await handles, removing each one once it has finished.
async fn join_all(handles: &mut Vec<JoinHandle<()>>) {
    while let Some(handle) = handles.last_mut() {
        let _ = handle.await;
        handles.pop();
    }
}
