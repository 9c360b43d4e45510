use crate::protocol::ToolInfo;
use crate::session::McpSession;

use async_trait::async_trait;
use chat_core::error::AgentError;
use chat_core::tool_registry::Tool;
use serde_json::Value;
use std::sync::Arc;

/// Exposes one MCP server tool to the agent.
pub struct McpTool {
    session: Arc<McpSession>,
    info: ToolInfo,
    description: String,
}

impl McpTool {
    pub fn new(session: Arc<McpSession>, info: ToolInfo) -> Self {
        let description = info
            .description
            .clone()
            .unwrap_or_else(|| format!("{} (from MCP server '{}')", info.name, session.name()));
        Self {
            session,
            info,
            description,
        }
    }

    pub fn server(&self) -> &str {
        self.session.name()
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.info.input_schema.clone()
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        let result = self
            .session
            .call_tool(&self.info.name, args)
            .await
            .map_err(|e| AgentError::ToolExecution {
                tool_name: self.info.name.clone(),
                message: e.to_string(),
            })?;

        let text = result.to_text();
        if result.is_error {
            return Err(AgentError::ToolExecution {
                tool_name: self.info.name.clone(),
                message: text,
            });
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_server, mcp_handler};
    use serde_json::json;

    async fn tools(names: &[&str]) -> Vec<McpTool> {
        let transport = fake_server("browser", mcp_handler(names));
        let session = Arc::new(
            McpSession::initialize("browser", transport)
                .await
                .map_err(|(_, e)| e)
                .unwrap(),
        );
        session
            .list_tools()
            .await
            .unwrap()
            .into_iter()
            .map(|info| McpTool::new(session.clone(), info))
            .collect()
    }

    #[tokio::test]
    async fn test_tool_metadata() {
        let tools = tools(&["echo"]).await;
        let tool = &tools[0];
        assert_eq!(tool.name(), "echo");
        assert_eq!(tool.description(), "echo tool");
        assert_eq!(tool.server(), "browser");
        assert_eq!(tool.parameters_schema()["properties"]["text"]["type"], "string");
    }

    #[tokio::test]
    async fn test_execute_returns_text() {
        let tools = tools(&["echo"]).await;
        let out = tools[0].execute(json!({"text": "ping"})).await.unwrap();
        assert_eq!(out, "ping");
    }

    #[tokio::test]
    async fn test_is_error_result_becomes_tool_error() {
        let tools = tools(&["broken"]).await;
        let err = tools[0].execute(json!({})).await.unwrap_err();
        match err {
            AgentError::ToolExecution { tool_name, message } => {
                assert_eq!(tool_name, "broken");
                assert_eq!(message, "page crashed");
            }
            other => panic!("expected tool error, got {:?}", other),
        }
    }
}
