//! `agentflow` command-line driver: runs a single task through a fresh agent
//! and lists the built-in tools.

mod config;

use agentflow_llm::OllamaProvider;
use agentflow_orchestrator::{
    AgentManager, Collaborators, Event, EventSubscription, Task, TaskState, TaskStatus,
};
use agentflow_tools::ToolFilter;
use clap::{Parser, Subcommand};
use config::CliConfig;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Parser)]
#[command(name = "agentflow", about = "agentflow: agent runtime with bounded task queues")]
struct Cli {
    /// Path to an optional TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an agent, run one task and print its events and final status
    Demo {
        /// Conversation input, research topic or analysis data (JSON or text)
        #[arg(short, long, default_value = "Hello, agent!")]
        input: String,
        /// Task type: conversation, research or analysis
        #[arg(short, long, default_value = "conversation")]
        task_type: String,
        /// Fail the task if it runs longer than this
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// List the built-in tools
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let mut config = CliConfig::load(cli.config.as_deref()).await?;
    config.apply_env();

    match cli.command {
        Commands::Demo {
            input,
            task_type,
            deadline_secs,
        } => run_demo(&config, &input, &task_type, deadline_secs).await,
        Commands::Tools => {
            let collaborators = Collaborators::in_memory()?;
            let tools = collaborators.tools.list(&ToolFilter::default());
            println!("Built-in tools:");
            for tool in &tools {
                let meta = tool.metadata();
                println!("  {} ({}) - {}", meta.id, meta.version, meta.description);
                for param in &meta.parameters {
                    let required = if param.required { "required" } else { "optional" };
                    println!("      {} [{required}]: {}", param.name, param.description);
                }
            }
            println!("\nTotal: {} tool(s)", tools.len());
            Ok(())
        }
    }
}

fn collaborators(config: &CliConfig) -> anyhow::Result<Collaborators> {
    let collaborators = Collaborators::in_memory()?;
    match config.llm.provider.as_str() {
        "echo" | "" => {}
        "ollama" => {
            let provider = OllamaProvider::new(config.llm.ollama.clone())?;
            collaborators.llm.register(Arc::new(provider))?;
            info!(base_url = %config.llm.ollama.base_url, "Using Ollama provider");
        }
        other => anyhow::bail!("unsupported llm provider '{other}' (expected echo or ollama)"),
    }
    Ok(collaborators)
}

fn build_task(task_type: &str, input: &str, deadline_secs: Option<u64>) -> anyhow::Result<Task> {
    let (key, value) = match task_type {
        "research" => ("topics", json!([input])),
        "analysis" => (
            "data",
            serde_json::from_str::<Value>(input).unwrap_or_else(|_| json!(input)),
        ),
        _ => ("input", json!(input)),
    };
    let mut task = Task::new(task_type)
        .with_description(format!("demo {task_type} task"))
        .with_param(key, value);
    if let Some(secs) = deadline_secs {
        let out_of_range = || anyhow::anyhow!("deadline of {secs}s is out of range");
        let offset = i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(out_of_range)?;
        let deadline = chrono::Utc::now()
            .checked_add_signed(offset)
            .ok_or_else(out_of_range)?;
        task = task.with_deadline(deadline);
    }
    Ok(task)
}

async fn run_demo(
    config: &CliConfig,
    input: &str,
    task_type: &str,
    deadline_secs: Option<u64>,
) -> anyhow::Result<()> {
    let manager = AgentManager::with_config(config.runtime.clone(), collaborators(config)?)?;
    let agent = manager.create_agent(config.agent_config()).await?;
    let mut events = manager.subscribe_to_events(agent.id())?;
    info!(agent_id = %agent.id(), name = %agent.name(), "Demo agent ready");

    let task_id = manager.assign_task(agent.id(), build_task(task_type, input, deadline_secs)?)?;
    let status = wait_for_terminal(&manager, &mut events, &task_id).await?;
    for event in events.drain() {
        print_event(&event);
    }

    println!("\n{}", serde_json::to_string_pretty(&status)?);
    let agent_status = manager.get_agent_status(agent.id())?;
    println!("{}", serde_json::to_string_pretty(&agent_status)?);

    manager.shutdown().await;
    for failure in manager.memory_write_failures() {
        warn!(memory_id = %failure.memory_id, error = %failure.error, "Memory write failed");
    }

    match (status.state, status.error) {
        (TaskState::Completed, _) => Ok(()),
        (state, Some(error)) => anyhow::bail!("task {task_id} {state}: {error}"),
        (state, None) => anyhow::bail!("task {task_id} ended {state}"),
    }
}

/// Print events as they arrive until the task is terminal.
async fn wait_for_terminal(
    manager: &AgentManager,
    events: &mut EventSubscription,
    task_id: &str,
) -> anyhow::Result<TaskStatus> {
    loop {
        let status = manager.get_task_status(task_id)?;
        if status.state.is_terminal() {
            return Ok(status);
        }
        tokio::select! {
            Some(event) = events.recv() => print_event(&event),
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}

fn print_event(event: &Event) {
    let data = match &event.data {
        Value::Object(map) if map.is_empty() => String::new(),
        data => data.to_string(),
    };
    println!(
        "[{}] {:<20} {data}",
        event.timestamp.format("%H:%M:%S%.3f"),
        event.kind.as_str()
    );
}
