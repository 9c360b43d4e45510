use crate::error::{McpError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Contents of an MCP server config file such as `browser_mcp.json`:
///
/// ```json
/// { "mcpServers": { "playwright": { "command": "npx", "args": ["@playwright/mcp@latest"] } } }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServersConfig {
    #[serde(rename = "mcpServers", default)]
    pub servers: BTreeMap<String, ServerSpec>,
}

/// How to launch one MCP server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSpec {
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// HTTP/SSE endpoint. Recognised so it can be rejected with a clear message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl McpServersConfig {
    /// Read and validate a config file. Missing or malformed files are errors.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            McpError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&contents)
            .map_err(|e| McpError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(McpError::Config("no servers defined under \"mcpServers\"".into()));
        }
        for (name, spec) in &self.servers {
            match (&spec.command, &spec.url) {
                (Some(cmd), _) if !cmd.trim().is_empty() => {}
                (_, Some(url)) => {
                    return Err(McpError::Config(format!(
                        "server '{}': remote transport ({}) is not supported, use a stdio command",
                        name, url
                    )));
                }
                _ => {
                    return Err(McpError::Config(format!("server '{}': missing \"command\"", name)));
                }
            }
        }
        Ok(())
    }
}

impl ServerSpec {
    /// The launch command. Only valid after validation.
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or_default()
    }
}
