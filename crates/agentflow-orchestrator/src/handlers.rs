//! Task handlers, selected by [`TaskKind`].

use crate::runtime::Runtime;
use crate::types::{Task, TaskKind, TaskResult};
use agentflow_core::{AgentflowError, AgentflowResult, ExecutionContext, Message, Params};
use agentflow_knowledge::Knowledge;
use agentflow_llm::ChatRequest;
use agentflow_memory::MemoryQuery;
use agentflow_tools::ToolCategory;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

const HISTORY_LIMIT: usize = 5;
const KNOWLEDGE_LIMIT: usize = 3;
const RESEARCH_KNOWLEDGE_LIMIT: usize = 5;

pub(crate) async fn dispatch(
    runtime: &Runtime,
    ctx: &ExecutionContext,
    task_id: &str,
    task: &Task,
) -> AgentflowResult<TaskResult> {
    ctx.check()?;
    match task.kind() {
        TaskKind::Conversation => conversation(runtime, ctx, task_id, &task.parameters).await,
        TaskKind::Research => research(runtime, ctx, task_id, &task.parameters).await,
        TaskKind::Analysis => analysis(&task.parameters),
        TaskKind::Unknown(other) => Err(AgentflowError::UnknownTaskType(other)),
    }
}

/// Error recorded on a failed task. Task-level errors are kept as they are;
/// anything raised by a collaborator is wrapped in `TaskExecutionFailed`.
pub(crate) fn task_error(err: AgentflowError) -> AgentflowError {
    match err {
        AgentflowError::UnknownTaskType(_)
        | AgentflowError::MissingParameter(_)
        | AgentflowError::TaskExecutionFailed(_)
        | AgentflowError::ToolNotFound(_)
        | AgentflowError::Cancelled
        | AgentflowError::DeadlineExceeded => err,
        other => AgentflowError::TaskExecutionFailed(other.to_string()),
    }
}

fn required_str<'a>(params: &'a Params, name: &str) -> AgentflowResult<&'a str> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentflowError::MissingParameter(name.to_string()))
}

fn required_strings(params: &Params, name: &str) -> AgentflowResult<Vec<String>> {
    let missing = || AgentflowError::MissingParameter(name.to_string());
    params
        .get(name)
        .and_then(Value::as_array)
        .ok_or_else(missing)?
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(missing))
        .collect()
}

fn is_interruption(err: &AgentflowError) -> bool {
    matches!(
        err,
        AgentflowError::Cancelled | AgentflowError::DeadlineExceeded
    )
}

// --- conversation ---

async fn conversation(
    runtime: &Runtime,
    ctx: &ExecutionContext,
    task_id: &str,
    params: &Params,
) -> AgentflowResult<TaskResult> {
    let input = required_str(params, "input")?;
    let agent = runtime.agent();

    let mut history_query = MemoryQuery::recent(HISTORY_LIMIT);
    history_query
        .context
        .insert("kind".to_string(), json!("conversation"));
    let history = match runtime.memory().recall(ctx, &history_query).await {
        Ok(history) => history,
        Err(e) if is_interruption(&e) => return Err(e),
        Err(e) => {
            debug!(agent_id = %agent.id(), error = %e, "Memory recall failed, continuing without history");
            Vec::new()
        }
    };

    let knowledge = match runtime.knowledge().relevant(ctx, input, KNOWLEDGE_LIMIT).await {
        Ok(items) => items,
        Err(e) if is_interruption(&e) => return Err(e),
        Err(e) => {
            debug!(agent_id = %agent.id(), error = %e, "Knowledge lookup failed, continuing without it");
            Vec::new()
        }
    };

    let (response, model, tokens) = match runtime.llm() {
        Some(llm) => {
            let model = &agent.config().model;
            let mut request = ChatRequest::new(
                model.model.clone(),
                build_messages(agent.name(), &agent.config().description, &knowledge, &history, input),
            );
            request.temperature = model.temperature;
            request.max_tokens = model.max_tokens;
            let reply = llm.chat(ctx, request).await?;
            (reply.message.content, reply.model, reply.usage.total_tokens)
        }
        None => (format!("This is a response to: {input}"), String::new(), 0),
    };

    if response.trim().is_empty() {
        return Err(AgentflowError::TaskExecutionFailed(
            "model returned an empty response".to_string(),
        ));
    }

    runtime.remember(
        task_id,
        "conversation",
        json!({ "input": input, "response": response }),
        None,
    );

    Ok(TaskResult::new(HashMap::from([("response".to_string(), json!(response))]))
        .with_metadata("tokens_used", tokens)
        .with_metadata("model", model)
        .with_metadata("memories_used", history.len())
        .with_metadata("knowledge_used", knowledge.len()))
}

fn build_messages(
    name: &str,
    description: &str,
    knowledge: &[Knowledge],
    history: &[agentflow_memory::Memory],
    input: &str,
) -> Vec<Message> {
    let mut system = if description.is_empty() {
        format!("You are {name}.")
    } else {
        format!("You are {name}. {description}")
    };
    if !knowledge.is_empty() {
        system.push_str("\n\nRelevant knowledge:");
        for item in knowledge {
            system.push_str("\n- ");
            system.push_str(&item.text());
        }
    }

    let mut messages = vec![Message::system(system)];
    // Recall is newest first.
    for memory in history.iter().rev() {
        let turn = (
            memory.content.get("input").and_then(Value::as_str),
            memory.content.get("response").and_then(Value::as_str),
        );
        if let (Some(user), Some(assistant)) = turn {
            messages.push(Message::user(user));
            messages.push(Message::assistant(assistant));
        }
    }
    messages.push(Message::user(input));
    messages
}

// --- research ---

async fn research(
    runtime: &Runtime,
    ctx: &ExecutionContext,
    task_id: &str,
    params: &Params,
) -> AgentflowResult<TaskResult> {
    let topics = required_strings(params, "topics")?;
    let search_tool = runtime
        .tool_in_category(ToolCategory::Search)
        .map(|t| t.id().to_string());

    let mut results = serde_json::Map::new();
    let mut tool_calls = 0usize;
    for (i, topic) in topics.iter().enumerate() {
        ctx.check()?;

        let knowledge: Vec<Value> = match runtime
            .knowledge()
            .semantic_search(ctx, topic, RESEARCH_KNOWLEDGE_LIMIT)
            .await
        {
            Ok(items) => items
                .iter()
                .map(|k| {
                    json!({
                        "id": k.id,
                        "kind": k.kind,
                        "content": k.content,
                        "score": k.similarity_score(),
                    })
                })
                .collect(),
            Err(e) if is_interruption(&e) => return Err(e),
            Err(e) => {
                debug!(topic = %topic, error = %e, "Knowledge search failed for topic");
                Vec::new()
            }
        };

        let mut entry = serde_json::Map::new();
        if let Some(tool_id) = &search_tool {
            tool_calls += 1;
            let params = Params::from([("query".to_string(), json!(topic))]);
            match runtime.call_tool(ctx, tool_id, params).await {
                Ok(found) => {
                    entry.insert("search".to_string(), found);
                }
                Err(e) if is_interruption(&e) => return Err(e),
                Err(e) => {
                    entry.insert("search_error".to_string(), json!(e.to_string()));
                }
            }
        }

        entry.insert(
            "summary".to_string(),
            json!(format!(
                "Research results for {topic}: {} knowledge item(s)",
                knowledge.len()
            )),
        );
        entry.insert("knowledge".to_string(), Value::Array(knowledge));
        results.insert(topic.clone(), Value::Object(entry));

        runtime.set_progress(task_id, (i + 1) as f32 / topics.len() as f32);
    }

    Ok(TaskResult::new(HashMap::from([(
        "research_results".to_string(),
        Value::Object(results),
    )]))
    .with_metadata("topics_count", topics.len())
    .with_metadata("tool_calls", tool_calls))
}

// --- analysis ---

fn analysis(params: &Params) -> AgentflowResult<TaskResult> {
    let data = params
        .get("data")
        .filter(|v| !v.is_null())
        .ok_or_else(|| AgentflowError::MissingParameter("data".to_string()))?;

    let (shape, elements) = match data {
        Value::Array(items) => ("array", items.len()),
        Value::Object(map) => ("object", map.len()),
        Value::String(s) => ("string", s.chars().count()),
        Value::Number(_) => ("number", 1),
        Value::Bool(_) => ("boolean", 1),
        Value::Null => ("null", 0),
    };

    let numbers: Vec<f64> = match data {
        Value::Array(items) => items.iter().filter_map(Value::as_f64).collect(),
        Value::Object(map) => map.values().filter_map(Value::as_f64).collect(),
        Value::Number(n) => n.as_f64().into_iter().collect(),
        _ => Vec::new(),
    };

    let mut summary = format!("{shape} with {elements} element(s)");
    let statistics = if numbers.is_empty() {
        Value::Null
    } else {
        let count = numbers.len();
        let sum: f64 = numbers.iter().sum();
        let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
        let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = sum / count as f64;
        summary.push_str(&format!(
            ", {count} numeric (min {min}, max {max}, mean {mean:.2})"
        ));
        json!({ "count": count, "sum": sum, "min": min, "max": max, "mean": mean })
    };

    Ok(TaskResult::new(HashMap::from([
        ("summary".to_string(), json!(summary)),
        ("shape".to_string(), json!(shape)),
        ("elements".to_string(), json!(elements)),
        ("statistics".to_string(), statistics),
    ]))
    .with_metadata("data_points", numbers.len()))
}
