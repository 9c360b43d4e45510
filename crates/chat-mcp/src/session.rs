use crate::config::ServerSpec;
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolResult, InitializeResult, ListToolsResult, ServerInfo, ToolInfo, PROTOCOL_VERSION,
};
use crate::transport::Transport;

use serde_json::{json, Value};
use tracing::{debug, info};

/// Upper bound on `tools/list` pages, in case a server keeps returning a cursor.
const MAX_TOOL_PAGES: usize = 64;

/// An initialized connection to one MCP server.
pub struct McpSession {
    name: String,
    transport: Transport,
    server_info: ServerInfo,
}

impl McpSession {
    /// Launch the server and perform the initialize handshake.
    pub async fn connect(name: &str, spec: &ServerSpec) -> Result<Self> {
        let transport = Transport::spawn(name, spec)?;
        match Self::initialize(name, transport).await {
            Ok(session) => Ok(session),
            Err((transport, e)) => {
                let _ = transport.close().await;
                Err(e)
            }
        }
    }

    /// Run the handshake over an existing transport. On failure the transport is
    /// handed back so the caller can close it.
    pub async fn initialize(
        name: &str,
        transport: Transport,
    ) -> std::result::Result<Self, (Transport, McpError)> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "mcp-chat", "version": env!("CARGO_PKG_VERSION")},
        });
        let result = match transport.request("initialize", Some(params)).await {
            Ok(value) => value,
            Err(e) => return Err((transport, e)),
        };
        let init: InitializeResult = match serde_json::from_value(result) {
            Ok(init) => init,
            Err(e) => return Err((transport, e.into())),
        };
        if init.protocol_version != PROTOCOL_VERSION {
            debug!(
                "Server '{}' negotiated protocol {} (requested {})",
                name, init.protocol_version, PROTOCOL_VERSION
            );
        }
        if let Err(e) = transport.notify("notifications/initialized", None).await {
            return Err((transport, e));
        }

        info!(
            "Connected to MCP server '{}' ({} {})",
            name, init.server_info.name, init.server_info.version
        );
        Ok(Self {
            name: name.to_string(),
            transport,
            server_info: init.server_info,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// All tools the server offers, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult =
                serde_json::from_value(self.transport.request("tools/list", params).await?)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }
        Err(McpError::Protocol(format!(
            "server '{}' returned more than {} pages of tools",
            self.name, MAX_TOOL_PAGES
        )))
    }

    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<CallToolResult> {
        let params = json!({ "name": tool, "arguments": arguments });
        let result = self.transport.request("tools/call", Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}
