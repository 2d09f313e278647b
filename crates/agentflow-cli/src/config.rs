use agentflow_llm::OllamaConfig;
use agentflow_orchestrator::{AgentConfig, RuntimeConfig};
use serde::Deserialize;
use std::path::Path;

/// Contents of `agentflow.toml`. Every table is optional.
#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub agent: Option<AgentConfig>,
}

/// `[llm]` table: which provider backs conversation tasks.
#[derive(Debug, Deserialize)]
pub struct LlmSection {
    /// `"echo"` or `"ollama"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    /// Ollama connection settings, ignored for `echo`.
    #[serde(flatten)]
    pub ollama: OllamaConfig,
}

fn default_provider() -> String {
    "echo".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: String::new(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl CliConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: CliConfig = toml::from_str(text)?;
        config.runtime.validate()?;
        Ok(config)
    }

    /// Read the config file, or fall back to defaults when no path is given.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {e}", path.display())
        })?;
        Self::parse(&text)
    }

    /// Apply environment overrides (`AGENTFLOW_LLM_PROVIDER`,
    /// `AGENTFLOW_LLM_MODEL`, `OLLAMA_BASE_URL`).
    pub fn apply_env(&mut self) {
        if let Ok(provider) = std::env::var("AGENTFLOW_LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("AGENTFLOW_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            self.llm.ollama.base_url = url;
        }
    }

    /// Agent definition for the demo, wired to the configured provider.
    pub fn agent_config(&self) -> AgentConfig {
        let mut agent = self
            .agent
            .clone()
            .unwrap_or_else(|| AgentConfig::new("demo-agent").with_tool("calculator"));
        agent.model.provider = self.llm.provider.clone();
        if agent.model.model.is_empty() {
            agent.model.model = self.llm.model.clone();
        }
        agent
    }
}
