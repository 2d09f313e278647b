#![allow(clippy::unwrap_used, clippy::expect_used)]

use agentflow_core::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// 1. Error codes are stable and distinct for the engine taxonomy
// ---------------------------------------------------------------------------

#[test]
fn taxonomy_codes_are_distinct() {
    let errors = [
        AgentflowError::AgentNotFound("a".into()),
        AgentflowError::TaskNotFound("t".into()),
        AgentflowError::InvalidConfig("c".into()),
        AgentflowError::ToolNotFound("x".into()),
        AgentflowError::QueueFull {
            agent_id: "a".into(),
            capacity: 1,
        },
        AgentflowError::UnknownTaskType("bogus".into()),
        AgentflowError::MissingParameter("input".into()),
        AgentflowError::TaskExecutionFailed("boom".into()),
    ];
    let mut codes: Vec<&str> = errors.iter().map(AgentflowError::code).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), errors.len());
}

#[test]
fn unknown_task_type_mentions_type() {
    let err = AgentflowError::UnknownTaskType("bogus".into());
    assert!(err.to_string().contains("bogus"));
}

#[test]
fn json_error_converts() {
    let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
    let err: AgentflowError = parse.unwrap_err().into();
    assert_eq!(err.code(), "json");
}

// ---------------------------------------------------------------------------
// 2. Message serialization
// ---------------------------------------------------------------------------

#[test]
fn message_serializes_lowercase_role() {
    let msg = Message::user("hello");
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["role"], "user");
    assert_eq!(json["content"], "hello");
    assert!(json.get("name").is_none());
}

// ---------------------------------------------------------------------------
// 3. Execution context deadlines
// ---------------------------------------------------------------------------

#[tokio::test]
async fn past_deadline_cancels_immediately() {
    let parent = CancellationToken::new();
    let deadline = chrono::Utc::now() - chrono::Duration::seconds(1);
    let ctx = ExecutionContext::for_task("t", "a", Some(deadline), &parent);

    let res = tokio::time::timeout(Duration::from_secs(2), ctx.cancelled()).await;
    assert!(res.is_ok(), "expired deadline should cancel the context");
    assert!(ctx.is_deadline_exceeded());
    assert_eq!(ctx.remaining(), Some(Duration::ZERO));
}

#[tokio::test]
async fn far_deadline_does_not_interrupt() {
    let parent = CancellationToken::new();
    let deadline = chrono::Utc::now() + chrono::Duration::seconds(60);
    let ctx = ExecutionContext::for_task("t", "a", Some(deadline), &parent);

    let out = ctx
        .run(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, AgentflowError>("done")
        })
        .await
        .unwrap();
    assert_eq!(out, "done");
    assert!(ctx.remaining().unwrap() > Duration::from_secs(30));
}
