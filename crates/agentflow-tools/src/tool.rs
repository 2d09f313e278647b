use agentflow_core::{AgentflowError, AgentflowResult, ExecutionContext, Params};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Coarse grouping used to discover tools by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    /// Information lookup.
    Search,
    /// Computation over data.
    Analysis,
    /// Content production.
    Generation,
    /// File or network I/O.
    Io,
    /// Host or runtime inspection.
    System,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolCategory::Search => write!(f, "search"),
            ToolCategory::Analysis => write!(f, "analysis"),
            ToolCategory::Generation => write!(f, "generation"),
            ToolCategory::Io => write!(f, "io"),
            ToolCategory::System => write!(f, "system"),
        }
    }
}

/// JSON shape expected for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Any,
}

impl ParamType {
    fn matches(self, value: &serde_json::Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
            ParamType::Any => true,
        }
    }
}

/// Declared parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
        default: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: false,
            default: Some(default),
        }
    }
}

/// Metadata describing a tool's identity and interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub categories: Vec<ToolCategory>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

/// Trait that all tools must implement.
///
/// `execute` receives the caller's [`ExecutionContext`]; long-running tools should
/// wrap their awaits in [`ExecutionContext::run`] so deadlines take effect.
#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;

    fn id(&self) -> &str {
        &self.metadata().id
    }

    /// Check parameters before execution. Defaults to the declared specs.
    fn validate(&self, params: &Params) -> AgentflowResult<()> {
        validate_against_specs(&self.metadata().parameters, params)
    }

    async fn execute(&self, ctx: &ExecutionContext, params: Params) -> AgentflowResult<serde_json::Value>;
}

/// Validate `params` against declared specs: required presence and JSON type.
/// Unknown parameters are accepted.
pub fn validate_against_specs(specs: &[ParameterSpec], params: &Params) -> AgentflowResult<()> {
    for spec in specs {
        match params.get(&spec.name) {
            None if spec.required => {
                return Err(AgentflowError::MissingParameter(spec.name.clone()));
            }
            None => {}
            Some(value) if !spec.param_type.matches(value) => {
                return Err(AgentflowError::InvalidParameter(format!(
                    "'{}' should be of type {:?}",
                    spec.name, spec.param_type
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}
