/// Arithmetic tool.
pub mod calculator;
/// Paragraph and sentence chunking tool.
pub mod text_splitter;

pub use calculator::CalculatorTool;
pub use text_splitter::{SplitOptions, TextSplitter, TextSplitterTool};

use crate::manager::ToolManager;
use agentflow_core::AgentflowResult;
use std::sync::Arc;

/// Register the standard set of built-in tools.
pub fn register_builtins(manager: &ToolManager) -> AgentflowResult<()> {
    manager.register(Arc::new(CalculatorTool::new()))?;
    manager.register(Arc::new(TextSplitterTool::new()))?;
    Ok(())
}
