//! Wire transports carrying JSON-RPC messages to an MCP server.

mod http;
mod stdio;
mod websocket;

use std::sync::Arc;

use agent_config::{McpServerConfig, McpTransportKind};
use async_trait::async_trait;
use serde_json::Value;

use super::error::McpResult;

pub use self::http::HttpTransport;
pub use self::stdio::{AUTH_TOKEN_ENV, StdioTransport};
pub use self::websocket::WebSocketTransport;

/// An open message channel to one server.
///
/// Implementations report I/O loss as [`McpError::Transport`] and flip
/// [`is_closed`](Self::is_closed) once the channel cannot carry further
/// traffic. Deadlines are applied by the caller.
///
/// [`McpError::Transport`]: super::McpError::Transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request and waits for the matching response's result.
    async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value>;

    /// Sends a notification.
    async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()>;

    /// Returns `true` once the channel is unusable.
    fn is_closed(&self) -> bool;

    /// Releases the channel. Idempotent.
    async fn close(&self);
}

/// Opens transports for a server configuration.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Establishes the raw channel described by `config`.
    async fn open(&self, config: &McpServerConfig) -> McpResult<Arc<dyn Transport>>;
}

/// Connector choosing the transport from [`McpServerConfig::transport`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConnector;

#[async_trait]
impl TransportConnector for DefaultConnector {
    async fn open(&self, config: &McpServerConfig) -> McpResult<Arc<dyn Transport>> {
        let transport: Arc<dyn Transport> = match config.transport() {
            McpTransportKind::Stdio => Arc::new(StdioTransport::spawn(config)?),
            McpTransportKind::Websocket => Arc::new(WebSocketTransport::connect(config).await?),
            McpTransportKind::Http => Arc::new(HttpTransport::new(config)?),
        };
        Ok(transport)
    }
}
