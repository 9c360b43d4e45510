//! Newline-delimited JSON-RPC over a pair of byte streams, usually the
//! stdin/stdout of a spawned MCP server.

use crate::config::ServerSpec;
use crate::error::{McpError, Result};
use crate::protocol::{Incoming, Notification, Request};

use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// How long a server gets to exit after its stdin is closed.
const EXIT_GRACE: Duration = Duration::from_secs(2);

type Reply = Result<Value>;

/// Requests awaiting a response. Once `closed` is set no new waiters are accepted.
#[derive(Default)]
struct Pending {
    closed: bool,
    waiters: HashMap<u64, oneshot::Sender<Reply>>,
}

pub struct Transport {
    name: String,
    /// `None` once closed; dropping it closes the server's stdin.
    writer: AsyncMutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>,
    pending: Arc<Mutex<Pending>>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    child: AsyncMutex<Option<Child>>,
    shut_down: AtomicBool,
}

impl Transport {
    /// Spawn the server process and attach to its stdio.
    pub fn spawn(name: &str, spec: &ServerSpec) -> Result<Self> {
        debug!("Starting MCP server '{}': {} {:?}", name, spec.command(), spec.args);
        let mut child = Command::new(spec.command())
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| McpError::Spawn {
                server: name.to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Protocol("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Protocol("child stdout unavailable".into()))?;
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(name.to_string(), stderr);
        }

        let mut transport = Self::from_streams(name, stdout, stdin);
        transport.child = AsyncMutex::new(Some(child));
        Ok(transport)
    }

    /// Attach to an already-connected pair of streams.
    pub fn from_streams<R, W>(name: &str, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending = Arc::new(Mutex::new(Pending::default()));
        let reader = tokio::spawn(read_loop(name.to_string(), reader, pending.clone()));
        Self {
            name: name.to_string(),
            writer: AsyncMutex::new(Some(Box::new(writer))),
            pending,
            next_id: AtomicU64::new(1),
            reader,
            child: AsyncMutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst) || lock(&self.pending).closed
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(McpError::Closed(self.name.clone()));
            }
            pending.waiters.insert(id, tx);
        }

        trace!("[{}] -> {} (id {})", self.name, method, id);
        if let Err(e) = self.send(&Request::new(id, method, params)).await {
            lock(&self.pending).waiters.remove(&id);
            return Err(e);
        }

        rx.await
            .map_err(|_| McpError::Closed(self.name.clone()))?
    }

    /// Send a notification; no response is expected.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        trace!("[{}] -> {} (notification)", self.name, method);
        self.send(&Notification::new(method, params)).await
    }

    async fn send<T: serde::Serialize>(&self, message: &T) -> Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| McpError::Closed(self.name.clone()))?;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Close stdin, give the server a moment to exit, then kill it.
    /// Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("Closing MCP transport '{}'", self.name);

        // Shutting down a ChildStdin doesn't close the pipe; only dropping it does.
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!("[{}] stdin already closed: {}", self.name, e);
            }
        }

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!("MCP server '{}' exited with {}", self.name, status),
                Ok(Err(e)) => warn!("Waiting for MCP server '{}' failed: {}", self.name, e),
                Err(_) => {
                    warn!("MCP server '{}' did not exit, killing it", self.name);
                    if let Err(e) = child.kill().await {
                        warn!("Killing MCP server '{}' failed: {}", self.name, e);
                    }
                }
            }
        }

        self.reader.abort();
        fail_all(&self.pending, &self.name);
        Ok(())
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn lock(pending: &Mutex<Pending>) -> std::sync::MutexGuard<'_, Pending> {
    // The lock is never held across a panic-prone section; recover if it was.
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn fail_all(pending: &Mutex<Pending>, name: &str) {
    let mut pending = lock(pending);
    pending.closed = true;
    for (_, waiter) in pending.waiters.drain() {
        let _ = waiter.send(Err(McpError::Closed(name.to_string())));
    }
}

async fn read_loop<R>(name: String, reader: R, pending: Arc<Mutex<Pending>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("[{}] server closed its output", name);
                break;
            }
            Err(e) => {
                warn!("[{}] read error: {}", name, e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let incoming: Incoming = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("[{}] ignoring malformed message: {}", name, e);
                continue;
            }
        };

        if !incoming.is_response() {
            debug!(
                "[{}] ignoring server message {}",
                name,
                incoming.method.as_deref().unwrap_or("<unknown>")
            );
            continue;
        }

        let Some(id) = incoming.id.as_ref().and_then(Value::as_u64) else {
            warn!("[{}] response with unexpected id {:?}", name, incoming.id);
            continue;
        };
        let reply = match (incoming.error, incoming.result) {
            (Some(err), _) => Err(McpError::Rpc {
                code: err.code,
                message: err.message,
            }),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(Value::Null),
        };
        trace!("[{}] <- response (id {})", name, id);

        let waiter = lock(&pending).waiters.remove(&id);
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(reply);
            }
            None => warn!("[{}] response for unknown request id {}", name, id),
        }
    }
    fail_all(&pending, &name);
}

fn forward_stderr(name: String, stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("[{} stderr] {}", name, line);
        }
    });
}
