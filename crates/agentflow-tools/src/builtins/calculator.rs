use crate::tool::{ParamType, ParameterSpec, Tool, ToolCategory, ToolMetadata};
use agentflow_core::{AgentflowError, AgentflowResult, ExecutionContext, Params};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

const OPERATIONS: [&str; 4] = ["add", "subtract", "multiply", "divide"];

/// Basic arithmetic over two numbers.
pub struct CalculatorTool {
    metadata: ToolMetadata,
}

impl CalculatorTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata {
                id: "calculator".to_string(),
                name: "Calculator".to_string(),
                description: "Perform add, subtract, multiply or divide on two numbers".to_string(),
                version: "1.0.0".to_string(),
                categories: vec![ToolCategory::Analysis],
                tags: vec!["math".to_string()],
                parameters: vec![
                    ParameterSpec::required(
                        "operation",
                        ParamType::String,
                        "One of add, subtract, multiply, divide",
                    ),
                    ParameterSpec::required("a", ParamType::Number, "Left operand"),
                    ParameterSpec::required("b", ParamType::Number, "Right operand"),
                ],
            },
        }
    }
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

fn number(params: &Params, name: &str) -> AgentflowResult<f64> {
    params
        .get(name)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| AgentflowError::MissingParameter(name.to_string()))
}

#[async_trait]
impl Tool for CalculatorTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn validate(&self, params: &Params) -> AgentflowResult<()> {
        crate::tool::validate_against_specs(&self.metadata.parameters, params)?;
        let op = params
            .get("operation")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if !OPERATIONS.contains(&op) {
            return Err(AgentflowError::InvalidParameter(format!(
                "unsupported operation '{op}'"
            )));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ExecutionContext, params: Params) -> AgentflowResult<serde_json::Value> {
        ctx.check()?;
        let op = params
            .get("operation")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentflowError::MissingParameter("operation".to_string()))?;
        let a = number(&params, "a")?;
        let b = number(&params, "b")?;

        let result = match op {
            "add" => a + b,
            "subtract" => a - b,
            "multiply" => a * b,
            "divide" => {
                if b == 0.0 {
                    return Err(AgentflowError::InvalidParameter(
                        "division by zero".to_string(),
                    ));
                }
                a / b
            }
            other => {
                return Err(AgentflowError::InvalidParameter(format!(
                    "unsupported operation '{other}'"
                )))
            }
        };

        debug!(operation = %op, result, "Calculator evaluated");
        Ok(json!({ "operation": op, "result": result }))
    }
}
