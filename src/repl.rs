use anyhow::Result;
use chat_core::config::AppConfig;
use chat_core::error::SessionError;
use chat_core::runner::{LineSource, LoopExit, Responder, SessionHost, SessionRunner};
use rustyline::error::ReadlineError;
use rustyline::{Config as RlConfig, DefaultEditor};
use tokio::sync::watch;

const BANNER: &str = "\n===== Interactive MCP Chat =====\nType 'exit', 'quit' or 'bye' to leave.\n";

/// Terminal input backed by rustyline, with history.
struct TerminalInput {
    editor: DefaultEditor,
}

impl LineSource for TerminalInput {
    fn read_line(&mut self, prompt: &str) -> Result<String, SessionError> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(line),
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                Err(SessionError::Interrupted)
            }
            Err(ReadlineError::Eof) => Err(SessionError::InputClosed),
            Err(e) => Err(SessionError::Input(e.to_string())),
        }
    }
}

/// Run the interactive chat until the user leaves, then close the host's sessions.
pub async fn run<R, H>(agent: &mut R, host: &H) -> Result<()>
where
    R: Responder,
    H: SessionHost,
{
    println!("{}", BANNER);

    let rl_config = RlConfig::builder().auto_add_history(true).build();
    let history_path = AppConfig::data_dir().join("repl_history.txt");
    let mut input = TerminalInput {
        editor: DefaultEditor::with_config(rl_config)?,
    };
    let _ = input.editor.load_history(&history_path);

    // Ctrl-C while a turn is in flight arrives as SIGINT rather than through rustyline.
    let (interrupt_tx, interrupt_rx) = watch::channel(false);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = interrupt_tx.send(true);
        }
    });

    let exit = SessionRunner::new(&mut input, agent, host, std::io::stdout())
        .with_interrupt(interrupt_rx)
        .run()
        .await;
    ctrl_c.abort();

    match exit {
        LoopExit::Farewell => tracing::debug!("Chat finished"),
        LoopExit::Unexpected(e) => tracing::debug!("Chat ended after input failure: {}", e),
        LoopExit::Interrupted => tracing::debug!("Chat interrupted"),
    }

    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = input.editor.save_history(&history_path);

    Ok(())
}
