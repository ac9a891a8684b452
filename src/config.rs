use serde::Deserialize;

use crate::agent::chat::DEFAULT_MAX_ATTEMPTS;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub image: ImageConfig,
    pub cosense: CosenseConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Supports ${ENV_VAR} substitution
    pub api_key: String,
    /// OpenAI-compatible API root, without trailing slash
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ImageConfig {
    /// Image model; the API default is used when unset
    pub model: Option<String>,
    /// e.g. "1024x1024"
    pub size: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CosenseConfig {
    /// Cosense (Scrapbox) project name, e.g. "stack-chan"
    pub project: String,
    #[serde(default = "default_cosense_base_url")]
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Text that counts as a mention of the bot on text-only transports
    #[serde(default = "default_mention_name")]
    pub mention_name: String,
    /// Number of recent channel messages handed to the model
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Completion round-trips allowed per reply
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Overrides the built-in persona
    pub system_prompt: Option<String>,
    /// Overrides the scripted greeting
    pub greeting: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_cosense_base_url() -> String {
    "https://scrapbox.io/api".to_string()
}

fn default_mention_name() -> String {
    "stackchan".to_string()
}

fn default_history_limit() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses a TOML document, expanding `${VAR}` references first.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        // Expand environment variables like ${OPENAI_API_KEY}
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.llm.api_key.trim().is_empty() {
            anyhow::bail!("OpenAI API key not specified");
        }
        if self.cosense.project.is_empty() {
            anyhow::bail!("invalid project name");
        }
        if self.agent.max_attempts == 0 {
            anyhow::bail!("agent.max_attempts must be at least 1");
        }
        Ok(())
    }
}
