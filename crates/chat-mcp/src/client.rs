use crate::config::McpServersConfig;
use crate::error::{McpError, Result};
use crate::session::McpSession;
use crate::tool::McpTool;

use async_trait::async_trait;
use chat_core::error::AgentError;
use chat_core::runner::SessionHost;
use chat_core::tool_registry::{Tool, ToolSource};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Owns the sessions to every configured MCP server.
///
/// Sessions are opened on first use and stay open until
/// [`close_all_sessions`](Self::close_all_sessions).
pub struct McpClient {
    config: McpServersConfig,
    sessions: Mutex<BTreeMap<String, Arc<McpSession>>>,
}

impl McpClient {
    pub fn from_config(config: McpServersConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Load the client from an `mcpServers` JSON file. Fails if the file is
    /// missing or malformed.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let config = McpServersConfig::load(path)?;
        info!(
            "Loaded {} MCP server(s) from {}",
            config.servers.len(),
            path.display()
        );
        Ok(Self::from_config(config))
    }

    pub fn server_names(&self) -> Vec<&str> {
        self.config.servers.keys().map(String::as_str).collect()
    }

    /// Names of the currently open sessions.
    pub async fn sessions(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    /// Connect to every configured server that has no open session yet.
    /// Sessions whose server has gone away are dropped and reconnected.
    /// Servers that connected stay open even if a later one fails.
    pub async fn create_all_sessions(&self) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let dead: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| session.is_closed())
            .map(|(name, _)| name.clone())
            .collect();
        for name in dead {
            if let Some(session) = sessions.remove(&name) {
                warn!("MCP server '{}' has gone away, reconnecting", name);
                if let Err(e) = session.close().await {
                    warn!("Error closing dead MCP session '{}': {}", name, e);
                }
            }
        }

        for (name, spec) in &self.config.servers {
            if sessions.contains_key(name) {
                continue;
            }
            let session = McpSession::connect(name, spec).await?;
            sessions.insert(name.clone(), Arc::new(session));
        }
        Ok(())
    }

    /// Close every open session. All sessions are attempted; the first
    /// failure is returned.
    pub async fn close_all_sessions(&self) -> Result<()> {
        let sessions = std::mem::take(&mut *self.sessions.lock().await);
        if sessions.is_empty() {
            return Ok(());
        }
        info!("Closing {} MCP session(s)", sessions.len());

        let results = join_all(sessions.values().map(|s| s.close())).await;
        let mut first_err: Option<McpError> = None;
        for (name, result) in sessions.keys().zip(results) {
            if let Err(e) = result {
                warn!("Error closing MCP session '{}': {}", name, e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    #[cfg(test)]
    pub(crate) async fn insert_session(&self, session: McpSession) {
        self.sessions
            .lock()
            .await
            .insert(session.name().to_string(), Arc::new(session));
    }
}

#[async_trait]
impl ToolSource for McpClient {
    async fn tools(&self) -> std::result::Result<Vec<Arc<dyn Tool>>, AgentError> {
        self.create_all_sessions().await?;
        let sessions: Vec<Arc<McpSession>> = self.sessions.lock().await.values().cloned().collect();

        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        for session in sessions {
            let infos = session.list_tools().await?;
            info!("MCP server '{}' offers {} tools", session.name(), infos.len());
            for info in infos {
                tools.push(Arc::new(McpTool::new(session.clone(), info)));
            }
        }
        Ok(tools)
    }
}

#[async_trait]
impl SessionHost for McpClient {
    async fn has_open_sessions(&self) -> bool {
        !self.sessions.lock().await.is_empty()
    }

    async fn close_sessions(&self) -> anyhow::Result<()> {
        Ok(self.close_all_sessions().await?)
    }
}
