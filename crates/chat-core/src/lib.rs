pub mod agent_loop;
pub mod config;
pub mod error;
pub mod memory;
pub mod provider;
pub mod runner;
pub mod tool_registry;
pub mod types;

pub use agent_loop::ChatAgent;
pub use config::AppConfig;
pub use error::{AgentError, SessionError, TurnError};
pub use memory::ConversationMemory;
pub use provider::{ChatModel, ModelHandle, ResolvedProvider};
pub use runner::{LineSource, LoopExit, Responder, SessionHost, SessionRunner};
pub use tool_registry::{Tool, ToolRegistry, ToolSource};
