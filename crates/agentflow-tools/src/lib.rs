//! Tool executor collaborator for agentflow agents.
//!
//! Agents reference tools by ID in their configuration; the orchestrator resolves
//! those references through a [`ToolManager`] when the agent is created and calls
//! them from task handlers under the task's execution context.
//!
//! # Main types
//!
//! - [`Tool`]: Trait implemented by every tool.
//! - [`ToolMetadata`]: Identity, version, categories, tags and parameter specs.
//! - [`ToolManager`]: Registration, resolution, filtering and execution.
//! - [`ToolRegistry`]: Category and tag index over registered tool metadata.

/// Ready-to-use tools.
pub mod builtins;
/// Tool manager (registration, resolution, execution).
pub mod manager;
/// Category and tag index.
pub mod registry;
/// Tool trait and metadata types.
pub mod tool;

pub use builtins::{register_builtins, CalculatorTool, TextSplitterTool};
pub use manager::{ToolFilter, ToolManager};
pub use registry::ToolRegistry;
pub use tool::{validate_against_specs, ParamType, ParameterSpec, Tool, ToolCategory, ToolMetadata};
