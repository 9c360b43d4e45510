use crate::error::AgentError;
use crate::types::{ToolOutput, ToolSchema};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (used in function calling).
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value) -> Result<String, AgentError>;
}

/// Something that can hand the agent a set of tools, opening whatever
/// connections it needs the first time it is asked.
#[async_trait]
pub trait ToolSource: Send + Sync {
    async fn tools(&self) -> Result<Vec<Arc<dyn Tool>>, AgentError>;
}

/// Registry of the tools available to one agent.
///
/// Ordered by name so the tool list sent to the model is stable across turns.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    pub fn from_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    /// Register a tool. Overwrites any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            tracing::warn!("Tool '{}' registered twice, keeping the latest", name);
        } else {
            tracing::debug!("Registered tool: {}", name);
        }
        self.tools.insert(name, tool);
    }

    pub fn list_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Schemas for every registered tool, suitable for sending to the model.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Execute a tool by name. Failures become error outputs for the model
    /// rather than failing the turn.
    pub async fn execute(&self, tool_name: &str, tool_call_id: &str, args: Value) -> ToolOutput {
        let (content, is_error) = match self.tools.get(tool_name) {
            Some(tool) => match tool.execute(args).await {
                Ok(content) => (content, false),
                Err(e) => (format!("Error: {}", e), true),
            },
            None => (format!("Tool not found: {}", tool_name), true),
        };
        ToolOutput {
            tool_call_id: tool_call_id.to_string(),
            content,
            is_error,
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
