use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
    CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::AgentError;
use crate::types::{Message, Role, ToolCall, ToolSchema};

/// A provider with its API key resolved from config or the environment.
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub api_base: String,
    pub model: String,
    /// `None` when neither the config nor the environment supplied a key.
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ResolvedProvider {
    pub fn from_config(config: &ProviderConfig) -> Self {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .filter(|k| !k.is_empty());
        Self {
            api_base: config.api_base.clone(),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// One model completion: either final text or a request to call tools.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// The language model as the agent sees it.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ModelReply, AgentError>;
}

/// OpenAI-compatible chat completions handle.
pub struct ModelHandle {
    client: Client<OpenAIConfig>,
    provider: ResolvedProvider,
}

impl ModelHandle {
    pub fn new(provider: ResolvedProvider) -> Self {
        // A missing key is not fatal here; the first request is rejected by the
        // endpoint and that surfaces as a turn error.
        if provider.api_key.is_none() {
            warn!("No API key configured for {}", provider.api_base);
        }
        let openai_config = OpenAIConfig::new()
            .with_api_base(&provider.api_base)
            .with_api_key(provider.api_key.clone().unwrap_or_default());

        Self {
            client: Client::with_config(openai_config),
            provider,
        }
    }
}

#[async_trait]
impl ChatModel for ModelHandle {
    fn model_name(&self) -> &str {
        &self.provider.model
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ModelReply, AgentError> {
        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder
            .model(&self.provider.model)
            .messages(to_openai_messages(messages)?)
            .temperature(self.provider.temperature)
            .max_completion_tokens(self.provider.max_tokens);
        if !tools.is_empty() {
            request_builder.tools(to_openai_tools(tools)?);
        }
        let request = request_builder
            .build()
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        debug!("Requesting completion from {} ({} messages)", self.provider.model, messages.len());
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("No choices in response".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ModelReply {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

fn to_openai_tools(schemas: &[ToolSchema]) -> Result<Vec<ChatCompletionTool>, AgentError> {
    schemas
        .iter()
        .map(|s| {
            let func = FunctionObjectArgs::default()
                .name(&s.name)
                .description(&s.description)
                .parameters(s.parameters.clone())
                .build()
                .map_err(|e| AgentError::Provider(format!("function '{}': {}", s.name, e)))?;
            ChatCompletionToolArgs::default()
                .r#type(ChatCompletionToolType::Function)
                .function(func)
                .build()
                .map_err(|e| AgentError::Provider(format!("tool '{}': {}", s.name, e)))
        })
        .collect()
}

/// Convert our Message types to async-openai request messages.
fn to_openai_messages(
    messages: &[Message],
) -> Result<Vec<ChatCompletionRequestMessage>, AgentError> {
    let provider_err = |e: async_openai::error::OpenAIError| AgentError::Provider(e.to_string());

    let mut result = Vec::with_capacity(messages.len());
    for msg in messages {
        let converted: ChatCompletionRequestMessage = match msg.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(msg.content.as_str())
                .build()
                .map_err(provider_err)?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content.as_str())
                .build()
                .map_err(provider_err)?
                .into(),
            Role::Assistant => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                builder.content(msg.content.as_str());
                if let Some(tool_calls) = &msg.tool_calls {
                    let tc_openai: Vec<ChatCompletionMessageToolCall> = tool_calls
                        .iter()
                        .map(|tc| ChatCompletionMessageToolCall {
                            id: tc.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect();
                    builder.tool_calls(tc_openai);
                }
                builder.build().map_err(provider_err)?.into()
            }
            Role::Tool => ChatCompletionRequestToolMessageArgs::default()
                .tool_call_id(msg.tool_call_id.as_deref().unwrap_or(""))
                .content(msg.content.as_str())
                .build()
                .map_err(provider_err)?
                .into(),
        };
        result.push(converted);
    }
    Ok(result)
}
