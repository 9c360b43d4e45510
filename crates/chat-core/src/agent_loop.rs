use crate::config::AgentConfig;
use crate::error::{AgentError, TurnError};
use crate::memory::ConversationMemory;
use crate::provider::ChatModel;
use crate::runner::Responder;
use crate::tool_registry::{ToolRegistry, ToolSource};
use crate::types::{Message, ToolOutput};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The agent: a step-bounded tool-calling loop with conversation memory.
pub struct ChatAgent {
    model: Arc<dyn ChatModel>,
    tool_source: Arc<dyn ToolSource>,
    /// Filled on the first turn; tool discovery opens the client's sessions.
    registry: Option<ToolRegistry>,
    memory: ConversationMemory,
    config: AgentConfig,
}

impl ChatAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tool_source: Arc<dyn ToolSource>,
        config: AgentConfig,
    ) -> Self {
        Self {
            model,
            tool_source,
            registry: None,
            memory: ConversationMemory::new(),
            config,
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    async fn ensure_tools(&mut self) -> Result<(), AgentError> {
        if self.registry.is_none() {
            let tools = self.tool_source.tools().await?;
            let registry = ToolRegistry::from_tools(tools);
            info!("Agent ready with {} tools", registry.len());
            self.registry = Some(registry);
        }
        Ok(())
    }

    /// Run one user turn and return the final assistant text.
    pub async fn run(&mut self, input: &str) -> Result<String, AgentError> {
        let mut running = Vec::new();
        if let Some(sys_prompt) = &self.config.system_prompt {
            running.push(Message::system(sys_prompt.as_str()));
        }
        if self.config.memory_enabled {
            running.extend(self.memory.messages().iter().cloned());
        }
        let user_msg = Message::user(input);
        running.push(user_msg.clone());

        self.ensure_tools().await?;
        let registry = self
            .registry
            .as_ref()
            .ok_or_else(|| AgentError::ToolSource("tool registry unavailable".into()))?;
        let schemas = registry.schemas();
        let max_steps = self.config.max_steps;

        for step in 1..=max_steps {
            debug!("Agent step {}/{}", step, max_steps);
            let reply = self.model.complete(&running, &schemas).await?;

            if reply.tool_calls.is_empty() {
                let final_message = Message::assistant(reply.content.as_str());
                if self.config.memory_enabled {
                    self.memory.record_turn(user_msg, final_message);
                }
                return Ok(reply.content);
            }

            running.push(Message::assistant_with_tool_calls(
                reply.content.as_str(),
                reply.tool_calls.clone(),
            ));

            for tc in &reply.tool_calls {
                info!("Calling tool: {}", tc.name);
                let output = match parse_arguments(&tc.arguments) {
                    Ok(args) => registry.execute(&tc.name, &tc.id, args).await,
                    Err(e) => ToolOutput {
                        tool_call_id: tc.id.clone(),
                        content: format!("Invalid JSON arguments: {}", e),
                        is_error: true,
                    },
                };
                if output.is_error {
                    warn!("Tool '{}' failed: {}", tc.name, output.content);
                }
                running.push(Message::tool_result(&tc.id, output.content));
            }
        }

        Err(AgentError::StepBudgetExceeded(max_steps))
    }
}

#[async_trait]
impl Responder for ChatAgent {
    async fn respond(&mut self, input: &str) -> Result<String, TurnError> {
        Ok(self.run(input).await?)
    }
}

/// Models sometimes send an empty string for tools that take no arguments.
fn parse_arguments(raw: &str) -> Result<serde_json::Value, serde_json::Error> {
    if raw.trim().is_empty() {
        Ok(serde_json::Value::Object(Default::default()))
    } else {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ModelReply;
    use crate::tool_registry::Tool;
    use crate::types::{Role, ToolCall, ToolSchema};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays canned replies and records what it was sent.
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<ModelReply, AgentError>>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<ModelReply, AgentError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            messages: &[Message],
            _tools: &[ToolSchema],
        ) -> Result<ModelReply, AgentError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(text("(script exhausted)")))
        }
    }

    struct Counter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Tool for Counter {
        fn name(&self) -> &str {
            "count"
        }
        fn description(&self) -> &str {
            "Increment a counter"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _args: Value) -> Result<String, AgentError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(n.to_string())
        }
    }

    /// Fails the first `failures` discovery attempts.
    struct StaticTools {
        tool: Arc<Counter>,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl ToolSource for StaticTools {
        async fn tools(&self) -> Result<Vec<Arc<dyn Tool>>, AgentError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(AgentError::ToolSource("server exited".into()));
            }
            Ok(vec![self.tool.clone() as Arc<dyn Tool>])
        }
    }

    fn text(s: &str) -> ModelReply {
        ModelReply {
            content: s.into(),
            tool_calls: Vec::new(),
        }
    }

    fn call(id: &str, args: &str) -> ModelReply {
        ModelReply {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: id.into(),
                name: "count".into(),
                arguments: args.into(),
            }],
        }
    }

    fn agent(model: Arc<ScriptedModel>, config: AgentConfig) -> (ChatAgent, Arc<Counter>) {
        let counter = Arc::new(Counter {
            calls: AtomicUsize::new(0),
        });
        let source = Arc::new(StaticTools {
            tool: counter.clone(),
            failures: AtomicUsize::new(0),
        });
        (ChatAgent::new(model, source, config), counter)
    }

    #[tokio::test]
    async fn test_plain_reply_is_remembered() {
        let model = ScriptedModel::new(vec![Ok(text("hello there")), Ok(text("again"))]);
        let (mut agent, _) = agent(model.clone(), AgentConfig::default());

        assert_eq!(agent.run("hello").await.unwrap(), "hello there");
        assert_eq!(agent.run("and now").await.unwrap(), "again");

        let contents: Vec<_> = agent.memory().messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "hello there", "and now", "again"]);

        // Second request carried system prompt + first turn + new input.
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[1].len(), 4);
        assert_eq!(seen[1][0].role, Role::System);
        assert_eq!(seen[1][1].content, "hello");
    }

    #[tokio::test]
    async fn test_memory_disabled_sends_only_current_input() {
        let model = ScriptedModel::new(vec![Ok(text("a")), Ok(text("b"))]);
        let config = AgentConfig {
            memory_enabled: false,
            system_prompt: None,
            ..AgentConfig::default()
        };
        let (mut agent, _) = agent(model.clone(), config);

        agent.run("first").await.unwrap();
        agent.run("second").await.unwrap();

        assert!(agent.memory().is_empty());
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[1].len(), 1);
        assert_eq!(seen[1][0].content, "second");
    }

    #[tokio::test]
    async fn test_tool_results_feed_next_step() {
        let model = ScriptedModel::new(vec![Ok(call("c1", "{}")), Ok(text("counted"))]);
        let (mut agent, counter) = agent(model.clone(), AgentConfig::default());

        assert_eq!(agent.run("count once").await.unwrap(), "counted");
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);

        let seen = model.seen.lock().unwrap();
        let last = seen[1].last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(last.content, "1");

        // Only the user/assistant pair is kept, not the tool traffic.
        assert_eq!(agent.memory().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_arguments_accepted() {
        let model = ScriptedModel::new(vec![Ok(call("c1", "")), Ok(text("ok"))]);
        let (mut agent, counter) = agent(model, AgentConfig::default());
        agent.run("go").await.unwrap();
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_arguments_reported_to_model() {
        let model = ScriptedModel::new(vec![Ok(call("c1", "{not json")), Ok(text("sorry"))]);
        let (mut agent, counter) = agent(model.clone(), AgentConfig::default());

        assert_eq!(agent.run("go").await.unwrap(), "sorry");
        assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
        let seen = model.seen.lock().unwrap();
        assert!(seen[1].last().unwrap().content.starts_with("Invalid JSON arguments"));
    }

    #[tokio::test]
    async fn test_step_budget_exceeded() {
        let replies = (0..5).map(|i| Ok(call(&format!("c{}", i), "{}"))).collect();
        let model = ScriptedModel::new(replies);
        let config = AgentConfig {
            max_steps: 3,
            ..AgentConfig::default()
        };
        let (mut agent, counter) = agent(model, config);

        let err = agent.run("loop forever").await.unwrap_err();
        assert!(matches!(err, AgentError::StepBudgetExceeded(3)));
        assert_eq!(counter.calls.load(Ordering::SeqCst), 3);
        assert!(agent.memory().is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_leaves_memory_untouched() {
        let model = ScriptedModel::new(vec![
            Err(AgentError::Provider("timeout".into())),
            Ok(text("recovered")),
        ]);
        let (mut agent, _) = agent(model, AgentConfig::default());

        let err = agent.respond("hello").await.unwrap_err();
        assert_eq!(err.to_string(), "Provider error: timeout");
        assert!(agent.memory().is_empty());

        assert_eq!(agent.respond("hello").await.unwrap(), "recovered");
        assert_eq!(agent.memory().len(), 2);
    }

    #[tokio::test]
    async fn test_tool_source_failure_is_retried_next_turn() {
        let model = ScriptedModel::new(vec![Ok(text("fine"))]);
        let counter = Arc::new(Counter {
            calls: AtomicUsize::new(0),
        });
        let source = Arc::new(StaticTools {
            tool: counter,
            failures: AtomicUsize::new(1),
        });
        let mut agent = ChatAgent::new(model, source, AgentConfig::default());

        let err = agent.run("hi").await.unwrap_err();
        assert!(matches!(err, AgentError::ToolSource(_)));
        assert!(agent.registry.is_none());

        assert_eq!(agent.run("hi").await.unwrap(), "fine");
        assert_eq!(agent.registry.as_ref().map(ToolRegistry::len), Some(1));
    }
}
