use std::sync::Arc;

use agent_config::McpServerConfig;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use super::Transport;
use crate::mcp::error::{McpError, McpResult};
use crate::mcp::protocol::{JsonRpcNotification, JsonRpcRequest};
use crate::mcp::rpc::PendingRequests;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SharedSink = Mutex<SplitSink<Socket, Message>>;

/// JSON-RPC over a websocket, one message per text frame.
pub struct WebSocketTransport {
    server: String,
    sink: Arc<SharedSink>,
    pending: Arc<PendingRequests>,
    reader: JoinHandle<()>,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("server", &self.server)
            .field("closed", &self.pending.is_closed())
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Opens the websocket at `config.endpoint()`, sending the auth token as
    /// a bearer credential on the upgrade request.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Connection`] if the upgrade fails.
    pub async fn connect(config: &McpServerConfig) -> McpResult<Self> {
        let server = config.name().to_owned();
        let connection_error = |reason: String| McpError::Connection {
            server: server.clone(),
            reason,
        };

        let mut request = config
            .endpoint()
            .into_client_request()
            .map_err(|err| connection_error(format!("invalid websocket endpoint: {err}")))?;
        if let Some(token) = config.auth_token() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| connection_error(format!("invalid auth token: {err}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (socket, _response) = connect_async(request)
            .await
            .map_err(|err| connection_error(format!("websocket upgrade failed: {err}")))?;
        let (sink, stream) = socket.split();

        let pending = Arc::new(PendingRequests::new(server.clone()));
        let sink = Arc::new(Mutex::new(sink));
        let reader = spawn_reader(
            server.clone(),
            stream,
            Arc::clone(&sink),
            Arc::clone(&pending),
        );
        debug!(server = %server, endpoint = %config.endpoint(), "MCP websocket opened");

        Ok(Self {
            server,
            sink,
            pending,
            reader,
        })
    }

    async fn send(&self, message: &impl Serialize) -> McpResult<()> {
        send_frame(&self.server, &self.sink, &self.pending, message).await
    }
}

async fn send_frame(
    server: &str,
    sink: &SharedSink,
    pending: &PendingRequests,
    message: &impl Serialize,
) -> McpResult<()> {
    let text = serde_json::to_string(message)
        .map_err(|err| McpError::protocol(format!("failed to encode message: {err}")))?;
    sink.lock()
        .await
        .send(Message::Text(text))
        .await
        .map_err(|err| {
            pending.fail_all("websocket send failed");
            McpError::transport(format!("websocket send to `{server}` failed: {err}"))
        })
}

fn spawn_reader(
    server: String,
    mut stream: SplitStream<Socket>,
    sink: Arc<SharedSink>,
    pending: Arc<PendingRequests>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let reply = match frame {
                Ok(Message::Text(text)) => pending.dispatch(&text),
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => pending.dispatch(text),
                    Err(err) => {
                        warn!(server = %server, error = %err, "non UTF-8 websocket frame");
                        None
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => None,
                Err(err) => {
                    warn!(server = %server, error = %err, "MCP websocket read failed");
                    break;
                }
            };
            if let Some(reply) = reply {
                if let Err(err) = send_frame(&server, &sink, &pending, &reply).await {
                    warn!(server = %server, error = %err, "reply to MCP server request failed");
                }
            }
        }
        debug!(server = %server, "MCP websocket closed");
        pending.fail_all("websocket closed");
    })
}

#[async_trait]
impl Transport for WebSocketTransport {
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
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
        self.reader.abort();
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
