//! Client side of the Model Context Protocol over stdio.
//!
//! [`McpClient`] reads an `mcpServers` config file, launches each server as a
//! child process on first use, and exposes the servers' tools to the agent.

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod tool;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::McpClient;
pub use config::{McpServersConfig, ServerSpec};
pub use error::McpError;
pub use session::McpSession;
pub use tool::McpTool;
