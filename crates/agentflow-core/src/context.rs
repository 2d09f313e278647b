use crate::{AgentflowError, AgentflowResult};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cancellation scope for a single unit of work.
///
/// Carries the task and agent identity, an optional absolute deadline and a
/// [`CancellationToken`]. When a deadline is set the token is cancelled
/// automatically once it elapses, so any collaborator call wrapped in
/// [`ExecutionContext::run`] observes the deadline. Calls that do not go through
/// the context are not interrupted.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    task_id: Option<String>,
    agent_id: Option<String>,
    deadline: Option<DateTime<Utc>>,
    token: CancellationToken,
}

impl ExecutionContext {
    /// A context with no identity, no deadline and a fresh token.
    pub fn background() -> Self {
        Self {
            task_id: None,
            agent_id: None,
            deadline: None,
            token: CancellationToken::new(),
        }
    }

    /// Build the context for one task execution.
    ///
    /// The token is a child of `parent`, so cancelling the parent (runtime
    /// shutdown) cancels the task too. Must be called inside a tokio runtime when
    /// `deadline` is set: a timer task cancels the token at the deadline.
    pub fn for_task(
        task_id: impl Into<String>,
        agent_id: impl Into<String>,
        deadline: Option<DateTime<Utc>>,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child_token();

        if let Some(deadline) = deadline {
            let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                token.cancel();
            } else {
                let timer = token.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(remaining) => timer.cancel(),
                        _ = timer.cancelled() => {}
                    }
                });
            }
        }

        Self {
            task_id: Some(task_id.into()),
            agent_id: Some(agent_id.into()),
            deadline,
            token,
        }
    }

    /// A derived context sharing identity and deadline; cancelling the child does
    /// not cancel `self`.
    pub fn child(&self) -> Self {
        Self {
            task_id: self.task_id.clone(),
            agent_id: self.agent_id.clone(),
            deadline: self.deadline,
            token: self.token.child_token(),
        }
    }

    /// ID of the task this context belongs to.
    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    /// ID of the agent executing the task.
    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    /// Absolute deadline, if any.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Time left before the deadline. `None` without a deadline, zero once past.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| (d - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    /// Whether the deadline has elapsed.
    pub fn is_deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Utc::now() >= d)
    }

    /// Whether the context was cancelled (explicitly or by deadline).
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel this context and all contexts derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Handle to the underlying token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Fail fast if the context is already done.
    pub fn check(&self) -> AgentflowResult<()> {
        if self.is_cancelled() || self.is_deadline_exceeded() {
            Err(self.cancellation_error())
        } else {
            Ok(())
        }
    }

    /// Race `fut` against cancellation. Returns [`AgentflowError::DeadlineExceeded`]
    /// when the deadline fired, [`AgentflowError::Cancelled`] otherwise.
    pub async fn run<F, T>(&self, fut: F) -> AgentflowResult<T>
    where
        F: Future<Output = AgentflowResult<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(self.cancellation_error()),
            out = fut => out,
        }
    }

    fn cancellation_error(&self) -> AgentflowError {
        if self.is_deadline_exceeded() {
            AgentflowError::DeadlineExceeded
        } else {
            AgentflowError::Cancelled
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_background_has_no_deadline() {
        let ctx = ExecutionContext::background();
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
        assert!(!ctx.is_cancelled());
        assert!(ctx.check().is_ok());
    }

    #[tokio::test]
    async fn test_run_completes_before_cancel() {
        let ctx = ExecutionContext::background();
        let out = ctx.run(async { Ok::<_, AgentflowError>(7) }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn test_explicit_cancel() {
        let ctx = ExecutionContext::background();
        ctx.cancel();
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, AgentflowError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentflowError::Cancelled));
    }

    #[tokio::test]
    async fn test_deadline_fires() {
        let parent = CancellationToken::new();
        let deadline = Utc::now() + chrono::Duration::milliseconds(30);
        let ctx = ExecutionContext::for_task("t1", "a1", Some(deadline), &parent);
        assert_eq!(ctx.task_id(), Some("t1"));
        assert_eq!(ctx.agent_id(), Some("a1"));

        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, AgentflowError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentflowError::DeadlineExceeded));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_past_deadline_is_done_immediately() {
        let parent = CancellationToken::new();
        let deadline = Utc::now() - chrono::Duration::seconds(10);
        let ctx = ExecutionContext::for_task("t1", "a1", Some(deadline), &parent);

        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(AgentflowError::DeadlineExceeded)));
        // Work that would resolve on its first poll still does not run.
        let err = ctx.run(async { Ok::<_, AgentflowError>(1) }).await.unwrap_err();
        assert!(matches!(err, AgentflowError::DeadlineExceeded));
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_elapsed_deadline_fails_check_before_timer_fires() {
        let ctx = ExecutionContext {
            task_id: None,
            agent_id: None,
            deadline: Some(Utc::now() - chrono::Duration::milliseconds(1)),
            token: CancellationToken::new(),
        };
        assert!(!ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(AgentflowError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_parent_cancel_propagates() {
        let parent = CancellationToken::new();
        let ctx = ExecutionContext::for_task("t1", "a1", None, &parent);
        parent.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(AgentflowError::Cancelled)));
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_affect_parent() {
        let ctx = ExecutionContext::background();
        let child = ctx.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!ctx.is_cancelled());
    }
}
