use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application configuration, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub agent: AgentConfig,
    pub mcp: McpConfig,
}

impl AppConfig {
    /// Load configuration from the default path (~/.config/mcp-chat/config.toml),
    /// falling back to defaults if the file doesn't exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mcp-chat")
            .join("config.toml")
    }

    /// Data directory for REPL history.
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mcp-chat")
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL for the OpenAI-compatible API.
    pub api_base: String,
    /// Model name.
    pub model: String,
    /// Explicit API key. Takes precedence over `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.groq.com/openai/v1".into(),
            model: "qwen-qwq-32b".into(),
            api_key: None,
            api_key_env: "GROQ_API_KEY".into(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Agent behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model/tool round trips allowed per turn.
    pub max_steps: usize,
    /// Carry earlier turns into each request.
    pub memory_enabled: bool,
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 15,
            memory_enabled: true,
            system_prompt: Some(
                "You are a helpful assistant with access to tools provided by MCP servers. \
                 Use them when they help answer the user's request."
                    .into(),
            ),
        }
    }
}

/// Where to find the MCP server definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// JSON file with an `mcpServers` map.
    pub config_file: PathBuf,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("browser_mcp.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("qwen-qwq-32b"));
        assert!(toml_str.contains("GROQ_API_KEY"));
        assert!(toml_str.contains("browser_mcp.json"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.model, config.provider.model);
        assert_eq!(parsed.agent.max_steps, 15);
        assert!(parsed.agent.memory_enabled);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent]\nmax_steps = 5\n\n[mcp]\nconfig_file = \"tools.json\"").unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.agent.max_steps, 5);
        assert!(config.agent.memory_enabled);
        assert_eq!(config.mcp.config_file, PathBuf::from("tools.json"));
        assert_eq!(config.provider.api_key_env, "GROQ_API_KEY");
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load_from(&dir.path().join("absent.toml")).is_err());
    }
}
