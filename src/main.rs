mod repl;

use anyhow::{Context, Result};
use chat_core::config::AppConfig;
use chat_core::{ChatAgent, ModelHandle, ResolvedProvider};
use chat_mcp::McpClient;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mcp-chat",
    about = "Interactive chat with an LLM agent that can use MCP server tools",
    version,
    author
)]
struct Cli {
    /// Path to config file (default: ~/.config/mcp-chat/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MCP server config file (default: browser_mcp.json)
    #[arg(long)]
    mcp_config: Option<PathBuf>,

    /// Override the model name
    #[arg(short, long)]
    model: Option<String>,

    /// Override the API base URL
    #[arg(long)]
    api_base: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Pick up GROQ_API_KEY and friends from a local .env, if there is one.
    let dotenv = dotenvy::dotenv();

    // Logs go to stderr so the transcript on stdout stays clean.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("mcp_chat=info,chat_core=info,chat_mcp=info,warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match dotenv {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
    }

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AppConfig::load()?,
    };

    if let Some(model) = cli.model {
        config.provider.model = model;
    }
    if let Some(api_base) = cli.api_base {
        config.provider.api_base = api_base;
    }
    if let Some(mcp_config) = cli.mcp_config {
        config.mcp.config_file = mcp_config;
    }

    println!("Initializing chat...");
    let (mut agent, client) = initialize(&config)?;

    repl::run(&mut agent, client.as_ref()).await
}

/// Build the MCP client and the agent. A missing or invalid MCP config fails
/// here, before the chat starts and before any server is spawned.
fn initialize(config: &AppConfig) -> Result<(ChatAgent, Arc<McpClient>)> {
    let client = Arc::new(
        McpClient::from_config_file(&config.mcp.config_file).with_context(|| {
            format!(
                "failed to load MCP config {}",
                config.mcp.config_file.display()
            )
        })?,
    );
    let model = Arc::new(ModelHandle::new(ResolvedProvider::from_config(&config.provider)));

    tracing::info!(
        "Model: {}, endpoint: {}, MCP servers: {}",
        config.provider.model,
        config.provider.api_base,
        client.server_names().join(", "),
    );

    let agent = ChatAgent::new(model, client.clone(), config.agent.clone());
    Ok((agent, client))
}
