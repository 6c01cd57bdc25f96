use std::process::Stdio;
use std::sync::Arc;

use agent_config::McpServerConfig;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Transport;
use crate::mcp::error::{McpError, McpResult};
use crate::mcp::protocol::{JsonRpcNotification, JsonRpcRequest};
use crate::mcp::rpc::PendingRequests;

type StdinWriter = Mutex<Option<BufWriter<ChildStdin>>>;

/// Environment variable carrying the configured auth token to the child.
pub const AUTH_TOKEN_ENV: &str = "MCP_AUTH_TOKEN";

/// Child process speaking newline-delimited JSON-RPC on stdin/stdout.
pub struct StdioTransport {
    server: String,
    writer: Arc<StdinWriter>,
    child: Mutex<Option<Child>>,
    pending: Arc<PendingRequests>,
    reader: JoinHandle<()>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("server", &self.server)
            .field("closed", &self.pending.is_closed())
            .finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// Spawns `config.endpoint()` with the configured arguments and
    /// environment and attaches to its standard streams.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Connection`] if the process cannot be started.
    pub fn spawn(config: &McpServerConfig) -> McpResult<Self> {
        let server = config.name().to_owned();
        let connection_error = |reason: String| McpError::Connection {
            server: server.clone(),
            reason,
        };

        let mut command = Command::new(config.endpoint());
        command
            .args(config.args())
            .envs(config.env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(token) = config.auth_token() {
            command.env(AUTH_TOKEN_ENV, token);
        }

        let mut child = command
            .spawn()
            .map_err(|err| connection_error(format!("failed to spawn `{}`: {err}", config.endpoint())))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| connection_error("child stdin unavailable".to_owned()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| connection_error("child stdout unavailable".to_owned()))?;

        let pending = Arc::new(PendingRequests::new(server.clone()));
        let writer = Arc::new(Mutex::new(Some(BufWriter::new(stdin))));
        let reader = spawn_reader(
            server.clone(),
            stdout,
            Arc::clone(&writer),
            Arc::clone(&pending),
        );
        debug!(server = %server, program = %config.endpoint(), "MCP stdio server spawned");

        Ok(Self {
            server,
            writer,
            child: Mutex::new(Some(child)),
            pending,
            reader,
        })
    }

    async fn send(&self, message: &impl Serialize) -> McpResult<()> {
        write_frame(&self.server, &self.writer, &self.pending, message).await
    }
}

async fn write_frame(
    server: &str,
    writer: &StdinWriter,
    pending: &PendingRequests,
    message: &impl Serialize,
) -> McpResult<()> {
    let mut line = serde_json::to_vec(message)
        .map_err(|err| McpError::protocol(format!("failed to encode message: {err}")))?;
    line.push(b'\n');

    let mut guard = writer.lock().await;
    let writer = guard
        .as_mut()
        .ok_or_else(|| McpError::transport(format!("stdin of `{server}` is closed")))?;
    let written = async {
        writer.write_all(&line).await?;
        writer.flush().await
    }
    .await;

    written.map_err(|err| {
        pending.fail_all("stdin write failed");
        McpError::transport(format!("failed to write to `{server}`: {err}"))
    })
}

fn spawn_reader(
    server: String,
    stdout: ChildStdout,
    writer: Arc<StdinWriter>,
    pending: Arc<PendingRequests>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(reply) = pending.dispatch(line) {
                        if let Err(err) = write_frame(&server, &writer, &pending, &reply).await {
                            warn!(server = %server, error = %err, "reply to MCP server request failed");
                        }
                    }
                }
                Ok(None) => {
                    debug!(server = %server, "MCP server closed stdout");
                    pending.fail_all("server closed stdout");
                    break;
                }
                Err(err) => {
                    warn!(server = %server, error = %err, "MCP stdout read failed");
                    pending.fail_all("stdout read failed");
                    break;
                }
            }
        }
    })
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        let request = self.pending.register()?;
        self.send(&JsonRpcRequest::new(request.id(), method, params))
            .await?;
        request.wait().await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        if self.pending.is_closed() {
            return Err(McpError::transport(format!(
                "connection to `{}` is closed",
                self.server
            )));
        }
        self.send(&JsonRpcNotification::new(method, params)).await
    }

    fn is_closed(&self) -> bool {
        self.pending.is_closed()
    }

    async fn close(&self) {
        self.pending.fail_all("transport closed");
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
        self.reader.abort();
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
