use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("MCP config error: {0}")]
    Config(String),

    #[error("Failed to start MCP server '{server}': {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MCP server returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP connection closed: {0}")]
    Closed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, McpError>;

impl From<McpError> for chat_core::AgentError {
    fn from(e: McpError) -> Self {
        chat_core::AgentError::ToolSource(e.to_string())
    }
}
