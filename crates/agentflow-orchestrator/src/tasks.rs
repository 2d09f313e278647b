use crate::types::{TaskFailure, TaskResult, TaskState, TaskStatus};
use agentflow_core::{AgentflowError, AgentflowResult};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct TaskEntry {
    status: TaskStatus,
    /// Set while the task is running.
    token: Option<CancellationToken>,
}

/// Status records of every task the manager has accepted.
///
/// All state changes go through [`TaskState::can_transition_to`]; a write that
/// would break the state machine is ignored and reported as `false`. That is
/// how a worker finishing a task that was cancelled meanwhile is discarded.
#[derive(Default)]
pub struct TaskTable {
    entries: RwLock<HashMap<String, TaskEntry>>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new pending task. Task IDs are unique per table.
    pub fn insert_pending(&self, task_id: &str, agent_id: &str) -> AgentflowResult<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(task_id) {
            return Err(AgentflowError::InvalidConfig(format!(
                "duplicate task id: {task_id}"
            )));
        }
        entries.insert(
            task_id.to_string(),
            TaskEntry {
                status: TaskStatus::pending(task_id, agent_id),
                token: None,
            },
        );
        Ok(())
    }

    /// Drop a record. Used when an enqueue is rejected.
    pub fn remove(&self, task_id: &str) -> Option<TaskStatus> {
        self.entries.write().remove(task_id).map(|e| e.status)
    }

    pub fn get(&self, task_id: &str) -> Option<TaskStatus> {
        self.entries.read().get(task_id).map(|e| e.status.clone())
    }

    pub fn state(&self, task_id: &str) -> Option<TaskState> {
        self.entries.read().get(task_id).map(|e| e.status.state)
    }

    /// Tasks of one agent, oldest first.
    pub fn list_for_agent(&self, agent_id: &str) -> Vec<TaskStatus> {
        let mut tasks: Vec<TaskStatus> = self
            .entries
            .read()
            .values()
            .filter(|e| e.status.agent_id == agent_id)
            .map(|e| e.status.clone())
            .collect();
        tasks.sort_by_key(|t| t.start_time);
        tasks
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// `pending -> running`. Returns `false` if the task was cancelled while queued.
    pub fn mark_running(&self, task_id: &str, token: CancellationToken) -> bool {
        self.transition(task_id, TaskState::Running, |entry| {
            entry.token = Some(token);
        })
    }

    pub fn mark_completed(&self, task_id: &str, result: TaskResult) -> bool {
        self.transition(task_id, TaskState::Completed, |entry| {
            entry.status.progress = 1.0;
            entry.status.result = Some(result);
            entry.status.end_time = Some(Utc::now());
            entry.token = None;
        })
    }

    pub fn mark_failed(&self, task_id: &str, err: &AgentflowError) -> bool {
        let failure = TaskFailure::from(err);
        self.transition(task_id, TaskState::Failed, |entry| {
            entry.status.error = Some(failure);
            entry.status.end_time = Some(Utc::now());
            entry.token = None;
        })
    }

    /// Cancel a task and interrupt its execution context if it is running.
    ///
    /// `Ok(None)` when the task is already terminal; otherwise the owning
    /// agent's ID.
    pub fn cancel(&self, task_id: &str) -> AgentflowResult<Option<String>> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(task_id)
            .ok_or_else(|| AgentflowError::TaskNotFound(task_id.to_string()))?;
        if entry.status.state.is_terminal() {
            return Ok(None);
        }
        entry.status.state = TaskState::Cancelled;
        entry.status.end_time = Some(Utc::now());
        if let Some(token) = entry.token.take() {
            token.cancel();
        }
        Ok(Some(entry.status.agent_id.clone()))
    }

    /// Cancel every open task of an agent. Returns the cancelled IDs.
    pub fn cancel_open_for_agent(&self, agent_id: &str) -> Vec<String> {
        let mut entries = self.entries.write();
        let now = Utc::now();
        let mut cancelled = Vec::new();
        for (id, entry) in entries.iter_mut() {
            if entry.status.agent_id == agent_id && !entry.status.state.is_terminal() {
                entry.status.state = TaskState::Cancelled;
                entry.status.end_time = Some(now);
                if let Some(token) = entry.token.take() {
                    token.cancel();
                }
                cancelled.push(id.clone());
            }
        }
        cancelled
    }

    /// Update progress of a running task, clamped to `[0, 1]`.
    pub fn set_progress(&self, task_id: &str, progress: f32) {
        if let Some(entry) = self.entries.write().get_mut(task_id) {
            if entry.status.state == TaskState::Running {
                entry.status.progress = progress.clamp(0.0, 1.0);
            }
        }
    }

    fn transition(&self, task_id: &str, next: TaskState, apply: impl FnOnce(&mut TaskEntry)) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(task_id) else {
            return false;
        };
        if !entry.status.state.can_transition_to(next) {
            debug!(
                task_id = %task_id,
                from = %entry.status.state,
                to = %next,
                "Ignoring illegal task transition"
            );
            return false;
        }
        entry.status.state = next;
        apply(entry);
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn result() -> TaskResult {
        TaskResult::new(HashMap::new())
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let table = TaskTable::new();
        table.insert_pending("t1", "a1").unwrap();
        let err = table.insert_pending("t1", "a1").unwrap_err();
        assert!(matches!(err, AgentflowError::InvalidConfig(_)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_happy_path() {
        let table = TaskTable::new();
        table.insert_pending("t1", "a1").unwrap();
        assert!(table.mark_running("t1", CancellationToken::new()));
        table.set_progress("t1", 0.5);
        assert_eq!(table.get("t1").unwrap().progress, 0.5);
        assert!(table.mark_completed("t1", result()));

        let status = table.get("t1").unwrap();
        assert_eq!(status.state, TaskState::Completed);
        assert_eq!(status.progress, 1.0);
        assert!(status.result.is_some());
        assert!(status.error.is_none());
        assert!(status.end_time.is_some());
    }

    #[test]
    fn test_cancelled_while_pending_is_skipped() {
        let table = TaskTable::new();
        table.insert_pending("t1", "a1").unwrap();
        assert_eq!(table.cancel("t1").unwrap().as_deref(), Some("a1"));
        assert!(!table.mark_running("t1", CancellationToken::new()));
        assert_eq!(table.state("t1"), Some(TaskState::Cancelled));
    }

    #[test]
    fn test_cancel_running_interrupts_and_blocks_resurrection() {
        let table = TaskTable::new();
        let token = CancellationToken::new();
        table.insert_pending("t1", "a1").unwrap();
        table.mark_running("t1", token.clone());

        table.cancel("t1").unwrap();
        assert!(token.is_cancelled());

        assert!(!table.mark_failed("t1", &AgentflowError::Cancelled));
        assert!(!table.mark_completed("t1", result()));
        let status = table.get("t1").unwrap();
        assert_eq!(status.state, TaskState::Cancelled);
        assert!(status.error.is_none());
    }

    #[test]
    fn test_cancel_terminal_is_noop() {
        let table = TaskTable::new();
        table.insert_pending("t1", "a1").unwrap();
        table.mark_running("t1", CancellationToken::new());
        table.mark_failed("t1", &AgentflowError::MissingParameter("input".to_string()));

        assert_eq!(table.cancel("t1").unwrap(), None);
        let status = table.get("t1").unwrap();
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.error.unwrap().code, "missing_parameter");
    }

    #[test]
    fn test_cancel_unknown() {
        let table = TaskTable::new();
        assert!(matches!(
            table.cancel("nope"),
            Err(AgentflowError::TaskNotFound(_))
        ));
    }

    #[test]
    fn test_cancel_open_for_agent() {
        let table = TaskTable::new();
        table.insert_pending("t1", "a1").unwrap();
        table.insert_pending("t2", "a1").unwrap();
        table.insert_pending("t3", "a2").unwrap();
        table.mark_running("t2", CancellationToken::new());
        table.mark_completed("t2", result());

        let cancelled = table.cancel_open_for_agent("a1");
        assert_eq!(cancelled, vec!["t1".to_string()]);
        assert_eq!(table.state("t3"), Some(TaskState::Pending));
        assert_eq!(table.list_for_agent("a1").len(), 2);
    }
}
