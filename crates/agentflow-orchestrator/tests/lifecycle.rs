#![allow(clippy::unwrap_used, clippy::expect_used)]

use agentflow_core::{AgentflowError, AgentflowResult, ExecutionContext, Params};
use agentflow_llm::{EchoProvider, LlmService, OllamaConfig, OllamaProvider};
use agentflow_memory::{
    Memory, MemoryConfig, MemoryFilter, MemoryManager, MemoryQuery, MemoryStats, MemoryStore,
};
use agentflow_orchestrator::*;
use agentflow_tools::{Tool, ToolCategory, ToolMetadata};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn manager() -> AgentManager {
    AgentManager::new(Collaborators::in_memory().unwrap())
}

/// Collaborators whose `echo` provider takes `delay` to answer.
fn slow_collaborators(delay: Duration) -> Collaborators {
    let llm = LlmService::new();
    llm.register(Arc::new(EchoProvider::with_delay(delay))).unwrap();
    Collaborators {
        llm: Arc::new(llm),
        ..Collaborators::in_memory().unwrap()
    }
}

async fn wait_for_terminal(manager: &AgentManager, task_id: &str) -> TaskStatus {
    tokio::time::timeout(WAIT, async {
        loop {
            let status = manager.get_task_status(task_id).unwrap();
            if status.state.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("task did not reach a terminal state")
}

async fn wait_for_state(manager: &AgentManager, task_id: &str, state: TaskState) {
    tokio::time::timeout(WAIT, async {
        while manager.get_task_status(task_id).unwrap().state != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("task did not reach the expected state");
}

/// Receive events until one of `kind` for `task_id` arrives.
async fn collect_until(
    sub: &mut EventSubscription,
    kind: EventKind,
    task_id: &str,
) -> Vec<Event> {
    let mut seen = Vec::new();
    tokio::time::timeout(WAIT, async {
        while let Some(event) = sub.recv().await {
            let done = event.kind == kind && event.task_id() == Some(task_id);
            seen.push(event);
            if done {
                return;
            }
        }
    })
    .await
    .expect("event did not arrive");
    seen
}

fn position(events: &[Event], kind: EventKind, task_id: &str) -> usize {
    events
        .iter()
        .position(|e| e.kind == kind && e.task_id() == Some(task_id))
        .unwrap_or_else(|| panic!("no {kind} event for {task_id}"))
}

struct FakeSearch {
    meta: ToolMetadata,
    panics: bool,
}

impl FakeSearch {
    fn new(id: &str, panics: bool) -> Self {
        Self {
            meta: ToolMetadata {
                id: id.to_string(),
                name: "Fake search".to_string(),
                description: "Returns the query as its only hit".to_string(),
                version: "1.0.0".to_string(),
                categories: vec![ToolCategory::Search],
                tags: vec!["test".to_string()],
                parameters: Vec::new(),
            },
            panics,
        }
    }
}

#[async_trait]
impl Tool for FakeSearch {
    fn metadata(&self) -> &ToolMetadata {
        &self.meta
    }

    async fn execute(&self, _ctx: &ExecutionContext, params: Params) -> AgentflowResult<Value> {
        if self.panics {
            panic!("search backend exploded");
        }
        Ok(json!({ "hits": [params["query"].clone()] }))
    }
}

/// Search tool that records how many calls overlap.
struct CountingSearch {
    meta: ToolMetadata,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for CountingSearch {
    fn metadata(&self) -> &ToolMetadata {
        &self.meta
    }

    async fn execute(&self, _ctx: &ExecutionContext, params: Params) -> AgentflowResult<Value> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({ "hits": [params["query"].clone()] }))
    }
}

struct BrokenStore;

#[async_trait]
impl MemoryStore for BrokenStore {
    fn id(&self) -> &str {
        "broken"
    }
    async fn store(&self, _ctx: &ExecutionContext, _memory: Memory) -> AgentflowResult<()> {
        Err(AgentflowError::Memory("store is read-only".to_string()))
    }
    async fn recall(&self, _ctx: &ExecutionContext, _query: &MemoryQuery) -> AgentflowResult<Vec<Memory>> {
        Err(AgentflowError::Memory("store is read-only".to_string()))
    }
    async fn forget(&self, _ctx: &ExecutionContext, _filter: &MemoryFilter) -> AgentflowResult<usize> {
        Ok(0)
    }
    async fn consolidate(&self, _ctx: &ExecutionContext) -> AgentflowResult<()> {
        Ok(())
    }
    async fn stats(&self, _ctx: &ExecutionContext) -> AgentflowResult<MemoryStats> {
        Ok(MemoryStats::default())
    }
}

struct BrokenMemoryManager;

#[async_trait]
impl MemoryManager for BrokenMemoryManager {
    async fn create_store(
        &self,
        _ctx: &ExecutionContext,
        _config: &MemoryConfig,
    ) -> AgentflowResult<Arc<dyn MemoryStore>> {
        Ok(Arc::new(BrokenStore))
    }
    async fn get_store(&self, _ctx: &ExecutionContext, _store_id: &str) -> AgentflowResult<Arc<dyn MemoryStore>> {
        Ok(Arc::new(BrokenStore))
    }
    async fn delete_store(&self, _ctx: &ExecutionContext, _store_id: &str) -> AgentflowResult<()> {
        Ok(())
    }
    async fn list_stores(&self, _ctx: &ExecutionContext) -> AgentflowResult<Vec<String>> {
        Ok(vec!["broken".to_string()])
    }
}

// ---------------------------------------------------------------------------
// 1. Agent creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_agent_returns_live_handle() {
    let manager = manager();
    let agent = manager
        .create_agent(AgentConfig::new("helper").with_tool("calculator"))
        .await
        .unwrap();

    assert!(!agent.id().is_empty());
    let status = manager.get_agent_status(agent.id()).unwrap();
    assert!(!status.state.is_terminal());
    assert_eq!(status.state, AgentState::Ready);

    let mut sub = manager.subscribe_to_events(agent.id()).unwrap();
    let kinds: Vec<EventKind> = sub.drain().into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::AgentInitialized, EventKind::AgentCreated]);
}

// ---------------------------------------------------------------------------
// 2. Every task terminates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_every_task_reaches_terminal_state() {
    let manager = manager();
    let agent = manager.create_agent(AgentConfig::new("helper")).await.unwrap();

    let tasks = [
        Task::new("conversation").with_param("input", "hi"),
        Task::new("analysis").with_param("data", json!([3, 1, 2])),
        Task::new("research").with_param("topics", json!(["rust"])),
        Task::new("bogus"),
        Task::new("conversation"),
    ];
    let mut ids = Vec::new();
    for task in tasks {
        ids.push(manager.assign_task(agent.id(), task).unwrap());
    }
    for id in &ids {
        let status = wait_for_terminal(&manager, id).await;
        assert!(status.end_time.is_some());
    }

    let resources = manager.get_agent_status(agent.id()).unwrap().resources;
    assert_eq!(resources.tasks_completed, 3);
    assert_eq!(resources.tasks_failed, 2);
    assert_eq!(manager.list_tasks(agent.id()).len(), 5);
}

// ---------------------------------------------------------------------------
// 3. Destroy is idempotent in effect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_destroy_twice_returns_not_found() {
    let manager = manager();
    let agent = manager.create_agent(AgentConfig::new("helper")).await.unwrap();
    let mut sub = manager.subscribe_to_events(agent.id()).unwrap();

    manager.destroy_agent(agent.id()).await.unwrap();
    assert_eq!(agent.state(), AgentState::Stopped);

    let err = manager.destroy_agent(agent.id()).await.unwrap_err();
    assert!(matches!(err, AgentflowError::AgentNotFound(_)));
    assert!(manager.list_agents().is_empty());

    let kinds: Vec<EventKind> = sub.drain().into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds.last(), Some(&EventKind::AgentStopped));
    // Channel is closed once the buffered events are consumed.
    assert!(sub.recv().await.is_none());
}

// ---------------------------------------------------------------------------
// 4. FIFO ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_tasks_start_in_fifo_order() {
    let manager = manager();
    let agent = manager.create_agent(AgentConfig::new("helper")).await.unwrap();
    let mut sub = manager.subscribe_to_events(agent.id()).unwrap();

    let t1 = manager
        .assign_task(agent.id(), Task::new("analysis").with_param("data", 1))
        .unwrap();
    let t2 = manager
        .assign_task(agent.id(), Task::new("analysis").with_param("data", 2))
        .unwrap();

    let events = collect_until(&mut sub, EventKind::TaskCompleted, &t2).await;
    assert!(
        position(&events, EventKind::TaskStarted, &t1) < position(&events, EventKind::TaskStarted, &t2)
    );
    assert!(
        position(&events, EventKind::TaskAssigned, &t1) < position(&events, EventKind::TaskStarted, &t1)
    );
    assert!(
        position(&events, EventKind::TaskStarted, &t1) < position(&events, EventKind::TaskCompleted, &t1)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_several_workers_run_one_task_at_a_time_in_order() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let collaborators = Collaborators::in_memory().unwrap();
    collaborators
        .tools
        .register(Arc::new(CountingSearch {
            meta: FakeSearch::new("web_search", false).meta,
            in_flight: in_flight.clone(),
            max_in_flight: max_in_flight.clone(),
        }))
        .unwrap();
    let config = RuntimeConfig {
        max_concurrent: 4,
        ..RuntimeConfig::default()
    };
    let manager = AgentManager::with_config(config, collaborators).unwrap();
    let agent = manager
        .create_agent(AgentConfig::new("researcher").with_tool("web_search"))
        .await
        .unwrap();
    let mut sub = manager.subscribe_to_events(agent.id()).unwrap();

    let ids: Vec<String> = (0..8)
        .map(|i| {
            manager
                .assign_task(
                    agent.id(),
                    Task::new("research").with_param("topics", json!([format!("topic {i}")])),
                )
                .unwrap()
        })
        .collect();
    let last = ids.last().unwrap();
    let events = collect_until(&mut sub, EventKind::TaskCompleted, last).await;

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    for id in &ids {
        assert_eq!(manager.get_task_status(id).unwrap().state, TaskState::Completed);
    }
    for pair in ids.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        assert!(
            position(&events, EventKind::TaskCompleted, prev)
                < position(&events, EventKind::TaskStarted, next)
        );
        assert!(
            position(&events, EventKind::TaskCompleted, prev)
                < position(&events, EventKind::TaskCompleted, next)
        );
    }
}

// ---------------------------------------------------------------------------
// 5. Unknown task type
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_task_type_fails() {
    let manager = manager();
    let agent = manager.create_agent(AgentConfig::new("helper")).await.unwrap();
    let mut sub = manager.subscribe_to_events(agent.id()).unwrap();

    let id = manager.assign_task(agent.id(), Task::new("bogus")).unwrap();
    let status = wait_for_terminal(&manager, &id).await;

    assert_eq!(status.state, TaskState::Failed);
    let error = status.error.unwrap();
    assert_eq!(error.code, "unknown_task_type");
    assert!(error.message.contains("bogus"));

    let events = collect_until(&mut sub, EventKind::TaskFailed, &id).await;
    let failed = events.last().unwrap();
    assert_eq!(failed.data["code"], json!("unknown_task_type"));
    assert!(failed.data["error"].as_str().unwrap().contains("bogus"));
}

// ---------------------------------------------------------------------------
// 6. Conversation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_conversation_completes_with_response() {
    let manager = manager();
    let agent = manager.create_agent(AgentConfig::new("helper")).await.unwrap();

    let id = manager
        .assign_task(agent.id(), Task::new("conversation").with_param("input", "hi"))
        .unwrap();
    let status = wait_for_terminal(&manager, &id).await;

    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(status.progress, 1.0);
    let result = status.result.unwrap();
    let response = result.data["response"].as_str().unwrap();
    assert!(!response.is_empty());
    assert!(response.contains("hi"));
    assert!(result.tokens_used() > 0);
}

#[tokio::test]
async fn test_conversation_without_llm_uses_canned_reply() {
    let manager = manager();
    let mut config = AgentConfig::new("offline");
    config.model.provider = String::new();
    let agent = manager.create_agent(config).await.unwrap();

    let id = manager
        .assign_task(agent.id(), Task::new("conversation").with_param("input", "ping"))
        .unwrap();
    let status = wait_for_terminal(&manager, &id).await;
    assert_eq!(
        status.result.unwrap().data["response"],
        json!("This is a response to: ping")
    );
}

// ---------------------------------------------------------------------------
// 7. Missing parameter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_conversation_without_input_fails() {
    let manager = manager();
    let agent = manager.create_agent(AgentConfig::new("helper")).await.unwrap();

    let id = manager
        .assign_task(agent.id(), Task::new("conversation"))
        .unwrap();
    let status = wait_for_terminal(&manager, &id).await;

    assert_eq!(status.state, TaskState::Failed);
    let message = status.error.unwrap().message;
    assert!(message.contains("missing"));
    assert!(message.contains("input"));
}

// ---------------------------------------------------------------------------
// 8. Queue capacity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_queue_rejects_without_blocking() {
    let config = RuntimeConfig {
        queue_capacity: 2,
        shutdown_timeout_ms: 200,
        ..RuntimeConfig::default()
    };
    let manager =
        AgentManager::with_config(config, slow_collaborators(Duration::from_secs(2))).unwrap();
    let agent = manager.create_agent(AgentConfig::new("busy")).await.unwrap();
    let conversation = || Task::new("conversation").with_param("input", "hold on");

    let first = manager.assign_task(agent.id(), conversation()).unwrap();
    wait_for_state(&manager, &first, TaskState::Running).await;

    let queued: Vec<String> = (0..2)
        .map(|_| manager.assign_task(agent.id(), conversation()).unwrap())
        .collect();

    let started = Instant::now();
    let err = manager.assign_task(agent.id(), conversation()).unwrap_err();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(matches!(
        err,
        AgentflowError::QueueFull { capacity: 2, .. }
    ));
    // The rejected task leaves no record behind.
    assert_eq!(manager.list_tasks(agent.id()).len(), 3);

    manager.destroy_agent(agent.id()).await.unwrap();
    for id in queued {
        assert_eq!(
            manager.get_task_status(&id).unwrap().state,
            TaskState::Cancelled
        );
    }
    assert!(manager.get_task_status(&first).unwrap().state.is_terminal());
}

// ---------------------------------------------------------------------------
// 9. Pause and resume
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_pause_is_a_status_flag() {
    let manager = manager();
    let agent = manager.create_agent(AgentConfig::new("helper")).await.unwrap();
    let mut sub = manager.subscribe_to_events(agent.id()).unwrap();

    manager.pause_agent(agent.id()).unwrap();
    assert_eq!(agent.state(), AgentState::Paused);

    // Tasks still enqueue and run while paused.
    let id = manager
        .assign_task(agent.id(), Task::new("analysis").with_param("data", json!([1, 2])))
        .unwrap();
    assert_eq!(wait_for_terminal(&manager, &id).await.state, TaskState::Completed);
    assert_eq!(agent.state(), AgentState::Paused);

    manager.resume_agent(agent.id()).unwrap();
    assert_eq!(agent.state(), AgentState::Running);

    let kinds: Vec<EventKind> = sub.drain().into_iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::AgentPaused));
    assert_eq!(kinds.last(), Some(&EventKind::AgentResumed));
}

// ---------------------------------------------------------------------------
// 10. Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cancel_running_task_is_not_resurrected() {
    let manager = AgentManager::new(slow_collaborators(Duration::from_millis(500)));
    let agent = manager.create_agent(AgentConfig::new("helper")).await.unwrap();
    let mut sub = manager.subscribe_to_events(agent.id()).unwrap();

    let id = manager
        .assign_task(agent.id(), Task::new("conversation").with_param("input", "slow"))
        .unwrap();
    wait_for_state(&manager, &id, TaskState::Running).await;

    manager.cancel_task(&id).unwrap();
    let status = manager.get_task_status(&id).unwrap();
    assert_eq!(status.state, TaskState::Cancelled);
    assert!(status.end_time.is_some());

    // The worker notices and frees up for the next task.
    let next = manager
        .assign_task(agent.id(), Task::new("analysis").with_param("data", 1))
        .unwrap();
    assert_eq!(wait_for_terminal(&manager, &next).await.state, TaskState::Completed);
    assert_eq!(manager.get_task_status(&id).unwrap().state, TaskState::Cancelled);

    let events = collect_until(&mut sub, EventKind::TaskCompleted, &next).await;
    position(&events, EventKind::TaskCancelled, &id);
    assert!(!events
        .iter()
        .any(|e| e.task_id() == Some(id.as_str())
            && matches!(e.kind, EventKind::TaskCompleted | EventKind::TaskFailed)));

    let resources = agent.status().resources;
    assert_eq!(resources.tasks_failed, 0);
    assert_eq!(resources.tasks_completed, 1);
}

#[tokio::test]
async fn test_cancel_terminal_task_is_noop() {
    let manager = manager();
    let agent = manager.create_agent(AgentConfig::new("helper")).await.unwrap();
    let id = manager
        .assign_task(agent.id(), Task::new("analysis").with_param("data", 7))
        .unwrap();
    wait_for_terminal(&manager, &id).await;

    manager.cancel_task(&id).unwrap();
    assert_eq!(manager.get_task_status(&id).unwrap().state, TaskState::Completed);
}

// ---------------------------------------------------------------------------
// 11. Deadlines
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_deadline_fails_slow_task() {
    let manager = AgentManager::new(slow_collaborators(Duration::from_secs(2)));
    let agent = manager.create_agent(AgentConfig::new("helper")).await.unwrap();

    let deadline = chrono::Utc::now() + chrono::Duration::milliseconds(100);
    let id = manager
        .assign_task(
            agent.id(),
            Task::new("conversation")
                .with_param("input", "take your time")
                .with_deadline(deadline),
        )
        .unwrap();

    let started = Instant::now();
    let status = wait_for_terminal(&manager, &id).await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(status.state, TaskState::Failed);
    assert_eq!(status.error.unwrap().code, "deadline_exceeded");
}

#[tokio::test]
async fn test_past_deadline_fails_without_running() {
    let manager = manager();
    let agent = manager.create_agent(AgentConfig::new("helper")).await.unwrap();
    let mut sub = manager.subscribe_to_events(agent.id()).unwrap();

    let id = manager
        .assign_task(
            agent.id(),
            Task::new("analysis")
                .with_param("data", json!([1, 2]))
                .with_deadline(chrono::Utc::now() - chrono::Duration::seconds(10)),
        )
        .unwrap();

    let status = wait_for_terminal(&manager, &id).await;
    assert_eq!(status.state, TaskState::Failed);
    assert!(status.result.is_none());
    assert_eq!(status.error.unwrap().code, "deadline_exceeded");

    let events = collect_until(&mut sub, EventKind::TaskFailed, &id).await;
    assert!(!events
        .iter()
        .any(|e| e.kind == EventKind::TaskCompleted && e.task_id() == Some(id.as_str())));
    assert_eq!(agent.status().resources.tasks_failed, 1);
}

// ---------------------------------------------------------------------------
// 12. Research and tool calls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_research_calls_search_tool() {
    let collaborators = Collaborators::in_memory().unwrap();
    collaborators
        .tools
        .register(Arc::new(FakeSearch::new("web_search", false)))
        .unwrap();
    let manager = AgentManager::new(collaborators);
    let agent = manager
        .create_agent(
            AgentConfig::new("researcher")
                .with_tool("calculator")
                .with_tool("web_search"),
        )
        .await
        .unwrap();
    let mut sub = manager.subscribe_to_events(agent.id()).unwrap();

    let id = manager
        .assign_task(
            agent.id(),
            Task::new("research").with_param("topics", json!(["rust", "tokio"])),
        )
        .unwrap();
    let status = wait_for_terminal(&manager, &id).await;
    assert_eq!(status.state, TaskState::Completed);

    let result = status.result.unwrap();
    let results = &result.data["research_results"];
    assert_eq!(results["rust"]["search"]["hits"], json!(["rust"]));
    assert_eq!(results["tokio"]["search"]["hits"], json!(["tokio"]));
    assert_eq!(result.metadata["tool_calls"], json!(2));
    assert_eq!(agent.status().resources.tool_calls, 2);

    let events = collect_until(&mut sub, EventKind::TaskCompleted, &id).await;
    let tool_events: Vec<&Event> = events
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                EventKind::ToolCallStarted | EventKind::ToolCallCompleted
            )
        })
        .collect();
    assert_eq!(tool_events.len(), 4);
    assert!(tool_events.iter().all(|e| e.data["tool_id"] == json!("web_search")));
}

#[tokio::test]
async fn test_panicking_tool_fails_task_only() {
    let collaborators = Collaborators::in_memory().unwrap();
    collaborators
        .tools
        .register(Arc::new(FakeSearch::new("flaky_search", true)))
        .unwrap();
    let manager = AgentManager::new(collaborators);
    let agent = manager
        .create_agent(AgentConfig::new("researcher").with_tool("flaky_search"))
        .await
        .unwrap();

    let id = manager
        .assign_task(
            agent.id(),
            Task::new("research").with_param("topics", json!(["anything"])),
        )
        .unwrap();
    let status = wait_for_terminal(&manager, &id).await;
    assert_eq!(status.state, TaskState::Failed);
    assert_eq!(status.error.unwrap().code, "task_execution_failed");

    // The worker survives.
    let next = manager
        .assign_task(agent.id(), Task::new("analysis").with_param("data", 1))
        .unwrap();
    assert_eq!(wait_for_terminal(&manager, &next).await.state, TaskState::Completed);
}

// ---------------------------------------------------------------------------
// 13. Background memory writes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_memory_write_failure_does_not_fail_task() {
    let collaborators = Collaborators {
        memory: Arc::new(BrokenMemoryManager),
        ..Collaborators::in_memory().unwrap()
    };
    let manager = AgentManager::new(collaborators);
    let agent = manager.create_agent(AgentConfig::new("forgetful")).await.unwrap();

    let id = manager
        .assign_task(agent.id(), Task::new("conversation").with_param("input", "remember me"))
        .unwrap();
    let status = wait_for_terminal(&manager, &id).await;
    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(status.result.unwrap().metadata["memories_used"], json!(0));

    let failures = tokio::time::timeout(WAIT, async {
        loop {
            let failures = manager.memory_write_failures();
            if !failures.is_empty() {
                return failures;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(failures[0].agent_id, agent.id());
    assert!(failures[0].error.contains("read-only"));
}

// ---------------------------------------------------------------------------
// 14. Event channel overflow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_event_channel_counts_drops() {
    let config = RuntimeConfig {
        event_capacity: 2,
        ..RuntimeConfig::default()
    };
    let manager =
        AgentManager::with_config(config, Collaborators::in_memory().unwrap()).unwrap();
    let agent = manager.create_agent(AgentConfig::new("chatty")).await.unwrap();
    assert_eq!(manager.dropped_events(agent.id()).unwrap(), 0);

    // agent_initialized and agent_created fill the channel.
    manager.pause_agent(agent.id()).unwrap();
    manager.resume_agent(agent.id()).unwrap();
    assert_eq!(manager.dropped_events(agent.id()).unwrap(), 2);

    let mut sub = manager.subscribe_to_events(agent.id()).unwrap();
    assert_eq!(sub.drain().len(), 2);
    assert!(matches!(
        manager.subscribe_to_events(agent.id()),
        Err(AgentflowError::InvalidConfig(_))
    ));
}

// ---------------------------------------------------------------------------
// 15. Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_shutdown_destroys_all_agents() {
    let manager = manager();
    let a = manager.create_agent(AgentConfig::new("a")).await.unwrap();
    let b = manager.create_agent(AgentConfig::new("b")).await.unwrap();
    let id = manager
        .assign_task(a.id(), Task::new("analysis").with_param("data", json!({ "x": 1 })))
        .unwrap();

    manager.shutdown().await;

    assert!(manager.list_agents().is_empty());
    assert_eq!(a.state(), AgentState::Stopped);
    assert_eq!(b.state(), AgentState::Stopped);
    assert!(manager.get_task_status(&id).unwrap().state.is_terminal());
    assert!(matches!(
        manager.assign_task(b.id(), Task::new("analysis")),
        Err(AgentflowError::AgentNotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// 16. Collaborator errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_llm_error_is_recorded_as_execution_failure() {
    let collaborators = Collaborators::in_memory().unwrap();
    let ollama = OllamaProvider::new(OllamaConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        timeout_secs: 1,
    })
    .unwrap();
    collaborators.llm.register(Arc::new(ollama)).unwrap();
    let manager = AgentManager::new(collaborators);

    // An empty model is rejected by the provider before any request is sent.
    let model = ModelConfig {
        provider: "ollama".to_string(),
        model: String::new(),
        ..ModelConfig::default()
    };
    let agent = manager
        .create_agent(AgentConfig::new("helper").with_model(model))
        .await
        .unwrap();
    let mut sub = manager.subscribe_to_events(agent.id()).unwrap();

    let id = manager
        .assign_task(agent.id(), Task::new("conversation").with_param("input", "hi"))
        .unwrap();
    let status = wait_for_terminal(&manager, &id).await;
    assert_eq!(status.state, TaskState::Failed);
    let error = status.error.unwrap();
    assert_eq!(error.code, "task_execution_failed");
    assert!(error.message.contains("llm error: model ID cannot be empty"));

    let events = collect_until(&mut sub, EventKind::TaskFailed, &id).await;
    let failed = &events[position(&events, EventKind::TaskFailed, &id)];
    assert_eq!(failed.data["code"], json!("task_execution_failed"));
}
