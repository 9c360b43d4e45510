//! The interactive session loop.
//!
//! Reads one line at a time, hands non-exit input to a [`Responder`], prints
//! the reply or the turn error, and always finishes by closing whatever
//! sessions the [`SessionHost`] still has open.

use crate::error::{SessionError, TurnError};
use async_trait::async_trait;
use std::io::Write;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Words that end the session, compared case-insensitively after trimming.
pub const EXIT_KEYWORDS: [&str; 3] = ["exit", "quit", "bye"];

pub const PROMPT: &str = "You: ";

/// Produces the reply for one turn.
#[async_trait]
pub trait Responder: Send {
    async fn respond(&mut self, input: &str) -> Result<String, TurnError>;
}

/// Owner of the live tool-server sessions that must be released on exit.
#[async_trait]
pub trait SessionHost: Send + Sync {
    async fn has_open_sessions(&self) -> bool;
    async fn close_sessions(&self) -> anyhow::Result<()>;
}

/// Line-oriented input.
pub trait LineSource {
    /// Next line without its trailing newline. End of input is
    /// [`SessionError::InputClosed`].
    fn read_line(&mut self, prompt: &str) -> Result<String, SessionError>;
}

impl<T: LineSource + ?Sized> LineSource for &mut T {
    fn read_line(&mut self, prompt: &str) -> Result<String, SessionError> {
        (**self).read_line(prompt)
    }
}

/// Result of a single turn, as seen by the loop driver.
#[derive(Debug)]
pub enum TurnOutcome {
    Reply(String),
    /// The turn failed; report it and keep going.
    Recoverable(String),
    /// The loop itself can't continue.
    Fatal(SessionError),
}

/// How the loop ended.
#[derive(Debug)]
pub enum LoopExit {
    /// The user typed an exit keyword.
    Farewell,
    /// Input or output failed.
    Unexpected(SessionError),
    Interrupted,
}

pub fn is_exit_keyword(input: &str) -> bool {
    let input = input.trim();
    EXIT_KEYWORDS.iter().any(|k| input.eq_ignore_ascii_case(k))
}

/// Interactive runner over one responder and one session host.
pub struct SessionRunner<'a, S, R, H, W> {
    input: S,
    responder: &'a mut R,
    host: &'a H,
    out: W,
    interrupt: Option<watch::Receiver<bool>>,
}

impl<'a, S, R, H, W> SessionRunner<'a, S, R, H, W>
where
    S: LineSource,
    R: Responder,
    H: SessionHost,
    W: Write,
{
    pub fn new(input: S, responder: &'a mut R, host: &'a H, out: W) -> Self {
        Self {
            input,
            responder,
            host,
            out,
            interrupt: None,
        }
    }

    /// Abandon an in-flight turn when `true` is published on this channel.
    pub fn with_interrupt(mut self, interrupt: watch::Receiver<bool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Run the loop to completion, then release the host's sessions.
    pub async fn run(mut self) -> LoopExit {
        let exit = self.run_loop().await;
        match &exit {
            LoopExit::Farewell => debug!("Session ended by user"),
            LoopExit::Unexpected(e) => {
                let _ = writeln!(self.out, "Unexpected error: {}", e);
            }
            LoopExit::Interrupted => {
                let _ = writeln!(self.out);
                info!("Session interrupted");
            }
        }
        let _ = self.out.flush();
        shutdown(self.host).await;
        exit
    }

    async fn run_loop(&mut self) -> LoopExit {
        loop {
            let line = match self.input.read_line(PROMPT) {
                Ok(line) => line,
                Err(SessionError::Interrupted) => return LoopExit::Interrupted,
                Err(e) => return LoopExit::Unexpected(e),
            };

            if is_exit_keyword(&line) {
                if let Err(e) = writeln!(self.out, "Exiting the chat...") {
                    return LoopExit::Unexpected(e.into());
                }
                return LoopExit::Farewell;
            }

            let written = match self.turn(&line).await {
                TurnOutcome::Reply(reply) => writeln!(self.out, "\nAssistant: {}", reply),
                TurnOutcome::Recoverable(message) => writeln!(self.out, "Error: {}", message),
                TurnOutcome::Fatal(SessionError::Interrupted) => return LoopExit::Interrupted,
                TurnOutcome::Fatal(e) => return LoopExit::Unexpected(e),
            };
            if let Err(e) = written.and_then(|_| self.out.flush()) {
                return LoopExit::Unexpected(e.into());
            }
        }
    }

    async fn turn(&mut self, line: &str) -> TurnOutcome {
        let result = match self.interrupt.as_mut() {
            Some(interrupt) => {
                tokio::select! {
                    result = self.responder.respond(line) => result,
                    _ = wait_for_interrupt(interrupt) => {
                        return TurnOutcome::Fatal(SessionError::Interrupted);
                    }
                }
            }
            None => self.responder.respond(line).await,
        };
        match result {
            Ok(reply) => TurnOutcome::Reply(reply),
            Err(e) => {
                warn!("Turn failed: {}", e);
                TurnOutcome::Recoverable(e.to_string())
            }
        }
    }
}

async fn wait_for_interrupt(rx: &mut watch::Receiver<bool>) {
    // A dropped sender means no interrupt can ever arrive.
    if rx.wait_for(|fired| *fired).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Close the host's sessions if any are open. Runs once per session.
pub async fn shutdown<H: SessionHost + ?Sized>(host: &H) {
    if !host.has_open_sessions().await {
        debug!("No open sessions to close");
        return;
    }
    info!("Closing open sessions");
    if let Err(e) = host.close_sessions().await {
        warn!("Failed to close sessions cleanly: {}", e);
    }
}
