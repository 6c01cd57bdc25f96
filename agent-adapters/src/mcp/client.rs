use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use agent_config::McpServerConfig;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::{McpError, McpResult};
use super::protocol::{
    CallToolResponse, InitializeParams, InitializeResult, ListToolsPage, MCP_PROTOCOL_VERSION,
    McpToolCall, McpToolDefinition, McpToolResult, ServerInfo,
};
use super::transport::{DefaultConnector, Transport, TransportConnector};

/// Lifecycle of an [`McpClient`] connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport is open.
    #[default]
    Disconnected,
    /// A handshake is in flight.
    Connecting,
    /// Handshake completed; requests are accepted.
    Connected,
    /// Transport was lost and a new handshake is in flight.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        })
    }
}

/// Exponential backoff between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            max: Duration::from_secs(5),
        }
    }
}

impl Backoff {
    /// Creates a policy starting at `initial` and doubling up to `max`.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Delay before the first retry.
    #[must_use]
    pub const fn initial(&self) -> Duration {
        self.initial
    }

    /// Upper bound on any delay.
    #[must_use]
    pub const fn max(&self) -> Duration {
        self.max
    }

    /// Delay following `current`.
    #[must_use]
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

/// Connection settings for an [`McpClient`].
#[derive(Clone, Debug)]
pub struct McpClientOptions {
    config: McpServerConfig,
    reconnect_on_disconnect: bool,
    backoff: Backoff,
}

impl From<McpServerConfig> for McpClientOptions {
    fn from(config: McpServerConfig) -> Self {
        Self::new(config)
    }
}

impl McpClientOptions {
    /// Wraps a server configuration with default lifecycle settings.
    #[must_use]
    pub fn new(config: McpServerConfig) -> Self {
        Self {
            config,
            reconnect_on_disconnect: false,
            backoff: Backoff::default(),
        }
    }

    /// Re-handshakes automatically when the transport is lost.
    #[must_use]
    pub fn with_reconnect_on_disconnect(mut self, enabled: bool) -> Self {
        self.reconnect_on_disconnect = enabled;
        self
    }

    /// Replaces the retry backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Server configuration.
    #[must_use]
    pub const fn config(&self) -> &McpServerConfig {
        &self.config
    }

    /// Whether transport loss triggers a reconnect.
    #[must_use]
    pub const fn reconnect_on_disconnect(&self) -> bool {
        self.reconnect_on_disconnect
    }

    /// Retry backoff.
    #[must_use]
    pub const fn backoff(&self) -> Backoff {
        self.backoff
    }
}

#[derive(Default)]
struct Link {
    state: ConnectionState,
    transport: Option<Arc<dyn Transport>>,
    server_info: Option<ServerInfo>,
}

/// Client for a single MCP server.
///
/// All operations except [`connect`](Self::connect) and
/// [`disconnect`](Self::disconnect) require the
/// [`Connected`](ConnectionState::Connected) state and fail with
/// [`McpError::NotConnected`] otherwise, without touching the network.
pub struct McpClient {
    options: McpClientOptions,
    connector: Arc<dyn TransportConnector>,
    link: RwLock<Link>,
    handshake: Mutex<()>,
}

impl fmt::Debug for McpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpClient")
            .field("server", &self.server())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl McpClient {
    /// Creates a disconnected client using the transport named in the
    /// configuration.
    #[must_use]
    pub fn new(options: impl Into<McpClientOptions>) -> Self {
        Self::with_connector(options, Arc::new(DefaultConnector))
    }

    /// Creates a disconnected client that opens transports through
    /// `connector`.
    #[must_use]
    pub fn with_connector(
        options: impl Into<McpClientOptions>,
        connector: Arc<dyn TransportConnector>,
    ) -> Self {
        Self {
            options: options.into(),
            connector,
            link: RwLock::new(Link::default()),
            handshake: Mutex::new(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Link> {
        self.link.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Link> {
        self.link.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        let mut link = self.write();
        if link.state != state {
            debug!(server = %self.server(), from = %link.state, to = %state, "MCP connection state changed");
            link.state = state;
        }
    }

    /// Configured server name.
    #[must_use]
    pub fn server(&self) -> &str {
        self.options.config.name()
    }

    /// Connection settings.
    #[must_use]
    pub const fn options(&self) -> &McpClientOptions {
        &self.options
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.read().state
    }

    /// Returns `true` when requests are accepted.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Server identity reported by the last successful handshake.
    #[must_use]
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.read().server_info.clone()
    }

    /// Opens the transport and performs the MCP handshake.
    ///
    /// A no-op when already connected. Concurrent callers wait for the
    /// in-flight handshake instead of starting another one. Failed attempts
    /// are retried up to the configured retry budget with backoff.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Connection`] when every attempt failed or timed
    /// out.
    pub async fn connect(&self) -> McpResult<()> {
        let _handshake = self.handshake.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        self.establish().await.inspect_err(|_| {
            self.set_state(ConnectionState::Disconnected);
        })
    }

    /// Releases the transport. Always succeeds; idempotent.
    pub async fn disconnect(&self) {
        let _handshake = self.handshake.lock().await;
        let transport = {
            let mut link = self.write();
            link.state = ConnectionState::Disconnected;
            link.server_info = None;
            link.transport.take()
        };

        if let Some(transport) = transport {
            transport.close().await;
            info!(server = %self.server(), "MCP server disconnected");
        }
    }

    /// Discovers every tool the server advertises, following pagination.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::NotConnected`] when not connected,
    /// [`McpError::Timeout`] when the server does not answer in time, and
    /// [`McpError::Protocol`] when a page cannot be decoded or the server
    /// hands back a cursor it already returned.
    pub async fn list_tools(&self) -> McpResult<Vec<McpToolDefinition>> {
        let mut tools = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.take().map(|cursor| json!({ "cursor": cursor }));
            let page: ListToolsPage = decode(self.rpc("tools/list", params).await?)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if !seen.insert(next.clone()) {
                        warn!(
                            server = %self.server(),
                            cursor = %next,
                            "MCP server repeated a tools/list cursor"
                        );
                        return Err(McpError::protocol(format!(
                            "server `{}` repeated tools/list cursor `{next}`",
                            self.server()
                        )));
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        debug!(server = %self.server(), tools = tools.len(), "MCP tools listed");
        Ok(tools)
    }

    /// Invokes a remote tool.
    ///
    /// The remote tool's own failure is returned as data in
    /// [`McpToolResult::error`], not as an `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::NotConnected`] when not connected, and transport,
    /// timeout, RPC, or protocol errors once retries are exhausted.
    pub async fn call_tool(&self, call: McpToolCall) -> McpResult<McpToolResult> {
        let raw = self.rpc("tools/call", Some(call.params())).await?;
        let response: CallToolResponse = decode(raw)?;
        Ok(response.into_tool_result(call.call_id))
    }

    fn active_transport(&self) -> McpResult<Arc<dyn Transport>> {
        let link = self.read();
        match (&link.state, &link.transport) {
            (ConnectionState::Connected, Some(transport)) => Ok(Arc::clone(transport)),
            _ => Err(McpError::NotConnected {
                server: self.server().to_owned(),
            }),
        }
    }

    async fn rpc(&self, method: &'static str, params: Option<Value>) -> McpResult<Value> {
        let attempts = self.options.config.max_retries().saturating_add(1);
        let mut delay = self.options.backoff.initial();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let transport = self.active_transport()?;
            let err = match self.send(transport.as_ref(), method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let usable = !transport.is_closed() || self.recover(&transport).await;
            if !usable || !err.is_retryable() || attempt >= attempts {
                return Err(err);
            }

            warn!(server = %self.server(), %method, attempt, error = %err, "MCP request failed; retrying");
            tokio::time::sleep(delay).await;
            delay = self.options.backoff.next(delay);
        }
    }

    async fn send(
        &self,
        transport: &dyn Transport,
        method: &'static str,
        params: Option<Value>,
    ) -> McpResult<Value> {
        tokio::time::timeout(self.options.config.timeout(), transport.request(method, params))
            .await
            .map_err(|_| McpError::Timeout {
                server: self.server().to_owned(),
                operation: method.to_owned(),
            })?
    }

    /// Handles the loss of `lost`. Returns `true` if a live transport is
    /// available afterwards.
    async fn recover(&self, lost: &Arc<dyn Transport>) -> bool {
        let _handshake = self.handshake.lock().await;
        {
            let link = self.read();
            match &link.transport {
                Some(current) if Arc::ptr_eq(current, lost) => {}
                Some(_) => return link.state == ConnectionState::Connected,
                None => return false,
            }
        }

        lost.close().await;
        {
            let mut link = self.write();
            link.transport = None;
            link.server_info = None;
        }

        if !self.options.reconnect_on_disconnect {
            self.set_state(ConnectionState::Disconnected);
            warn!(server = %self.server(), "MCP transport lost");
            return false;
        }

        self.set_state(ConnectionState::Reconnecting);
        match self.establish().await {
            Ok(()) => true,
            Err(err) => {
                self.set_state(ConnectionState::Disconnected);
                warn!(server = %self.server(), error = %err, "MCP reconnect failed");
                false
            }
        }
    }

    async fn establish(&self) -> McpResult<()> {
        let attempts = self.options.config.max_retries().saturating_add(1);
        let mut delay = self.options.backoff.initial();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.handshake_once().await {
                Ok((transport, server_info)) => {
                    info!(
                        server = %self.server(),
                        remote = %server_info.name,
                        version = %server_info.version,
                        "MCP server connected"
                    );
                    let mut link = self.write();
                    link.transport = Some(transport);
                    link.server_info = Some(server_info);
                    link.state = ConnectionState::Connected;
                    return Ok(());
                }
                Err(err) if attempt < attempts => {
                    warn!(server = %self.server(), attempt, error = %err, "MCP handshake failed; retrying");
                    tokio::time::sleep(delay).await;
                    delay = self.options.backoff.next(delay);
                }
                Err(err) => {
                    return Err(match err {
                        McpError::Connection { .. } => err,
                        other => McpError::Connection {
                            server: self.server().to_owned(),
                            reason: other.to_string(),
                        },
                    });
                }
            }
        }
    }

    async fn handshake_once(&self) -> McpResult<(Arc<dyn Transport>, ServerInfo)> {
        let limit = self.options.config.timeout();
        let transport = tokio::time::timeout(limit, self.connector.open(&self.options.config))
            .await
            .map_err(|_| McpError::Timeout {
                server: self.server().to_owned(),
                operation: "connect".to_owned(),
            })??;

        match tokio::time::timeout(limit, initialize(self.server(), transport.as_ref())).await {
            Ok(Ok(server_info)) => Ok((transport, server_info)),
            Ok(Err(err)) => {
                transport.close().await;
                Err(err)
            }
            Err(_) => {
                transport.close().await;
                Err(McpError::Timeout {
                    server: self.server().to_owned(),
                    operation: "initialize".to_owned(),
                })
            }
        }
    }
}

async fn initialize(server: &str, transport: &dyn Transport) -> McpResult<ServerInfo> {
    let params = serde_json::to_value(InitializeParams::for_this_client())
        .map_err(|err| McpError::protocol(format!("failed to encode initialize: {err}")))?;
    let result: InitializeResult = decode(transport.request("initialize", Some(params)).await?)?;

    if result.protocol_version != MCP_PROTOCOL_VERSION {
        debug!(
            server = %server,
            requested = MCP_PROTOCOL_VERSION,
            negotiated = %result.protocol_version,
            "MCP server negotiated a different protocol version"
        );
    }

    transport.notify("notifications/initialized", None).await?;
    Ok(result.server_info)
}

fn decode<T: DeserializeOwned>(value: Value) -> McpResult<T> {
    serde_json::from_value(value)
        .map_err(|err| McpError::protocol(format!("unexpected response shape: {err}")))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;
    use crate::mcp::testing::{FakeConnector, FakeServer, Failure, server_config};

    fn client(
        server: &Arc<FakeServer>,
        configure: impl FnOnce(McpClientOptions) -> McpClientOptions,
    ) -> McpClient {
        let options = configure(
            McpClientOptions::new(server_config(2))
                .with_backoff(Backoff::new(Duration::from_millis(1), Duration::from_millis(4))),
        );
        McpClient::with_connector(options, FakeConnector::shared(server))
    }

    #[tokio::test]
    async fn list_tools_while_disconnected_does_no_io() {
        let server = FakeServer::with_tools(&["echo"]);
        let client = client(&server, |o| o);

        let err = client.list_tools().await.expect_err("not connected");
        assert!(matches!(err, McpError::NotConnected { server } if server == "fake"));
        assert_eq!(server.opens.load(Ordering::SeqCst), 0);
        assert_eq!(server.requests.load(Ordering::SeqCst), 0);

        let err = client
            .call_tool(McpToolCall::new("echo", json!({})))
            .await
            .expect_err("not connected");
        assert!(matches!(err, McpError::NotConnected { .. }));
        assert_eq!(server.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn connect_performs_handshake_once() {
        let server = FakeServer::with_tools(&["echo"]);
        let client = client(&server, |o| o);

        client.connect().await.unwrap();
        client.connect().await.unwrap();

        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(server.opens.load(Ordering::SeqCst), 1);
        assert_eq!(server.method_count("initialize"), 1);
        assert_eq!(server.method_count("notifications/initialized"), 1);
        assert_eq!(client.server_info().unwrap().name, "fake-server");
    }

    #[tokio::test]
    async fn concurrent_connects_share_one_handshake() {
        let server = FakeServer::with_tools(&["echo"]);
        server.set_open_delay(Duration::from_millis(20));
        let client = client(&server, |o| o);

        let (first, second) = tokio::join!(client.connect(), client.connect());
        first.unwrap();
        second.unwrap();
        assert_eq!(server.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_retries_then_succeeds() {
        let server = FakeServer::with_tools(&["echo"]);
        server.fail_opens(2);
        let client = client(&server, |o| o);

        client.connect().await.unwrap();
        assert_eq!(server.opens.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn connect_failure_is_connection_error() {
        let server = FakeServer::with_tools(&["echo"]);
        server.fail_opens(10);
        let client = client(&server, |o| o);

        let err = client.connect().await.expect_err("all attempts fail");
        assert!(matches!(err, McpError::Connection { .. }));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(server.opens.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let server = FakeServer::with_tools(&["echo"]);
        let client = client(&server, |o| o);

        client.disconnect().await;
        client.connect().await.unwrap();
        client.disconnect().await;
        client.disconnect().await;

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.server_info().is_none());
        assert!(matches!(
            client.list_tools().await,
            Err(McpError::NotConnected { .. })
        ));
    }

    #[tokio::test]
    async fn list_tools_follows_cursor() {
        let server = FakeServer::with_tools(&["a", "b", "c", "d", "e"]);
        server.set_page_size(2);
        let client = client(&server, |o| o);
        client.connect().await.unwrap();

        let names: Vec<_> = client
            .list_tools()
            .await
            .unwrap()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(names, ["a", "b", "c", "d", "e"]);
        assert_eq!(server.method_count("tools/list"), 3);
    }

    #[tokio::test]
    async fn repeated_cursor_stops_pagination() {
        let server = FakeServer::with_tools(&["a", "b"]);
        server.set_stuck_cursor("same");
        let client = client(&server, |o| o);
        client.connect().await.unwrap();

        let err = tokio::time::timeout(Duration::from_secs(1), client.list_tools())
            .await
            .expect("pagination terminates")
            .expect_err("cursor loop");
        assert!(matches!(err, McpError::Protocol { reason } if reason.contains("same")));
        assert_eq!(server.method_count("tools/list"), 2);
    }

    #[tokio::test]
    async fn transport_failures_are_retried() {
        let server = FakeServer::with_tools(&["echo"]);
        let client = client(&server, |o| o);
        client.connect().await.unwrap();
        server.fail_next("tools/call", Failure::Transport, 2);

        let result = client
            .call_tool(McpToolCall::new("echo", json!({ "text": "hi" })))
            .await
            .unwrap();
        assert_eq!(result.output, json!("hi"));
        assert_eq!(server.method_count("tools/call"), 3);
    }

    #[tokio::test]
    async fn rpc_errors_are_not_retried() {
        let server = FakeServer::with_tools(&["echo"]);
        let client = client(&server, |o| o);
        client.connect().await.unwrap();
        server.fail_next("tools/call", Failure::Rpc, 1);

        let err = client
            .call_tool(McpToolCall::new("echo", json!({})))
            .await
            .expect_err("rpc error");
        assert!(matches!(err, McpError::Rpc { .. }));
        assert_eq!(server.method_count("tools/call"), 1);
    }

    #[tokio::test]
    async fn tool_error_is_data() {
        let server = FakeServer::with_tools(&["echo"]);
        let client = client(&server, |o| o);
        client.connect().await.unwrap();

        let result = client
            .call_tool(McpToolCall::new("missing", json!({})))
            .await
            .unwrap();
        assert_eq!(result.error.as_deref(), Some("unknown tool missing"));
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let server = FakeServer::with_tools(&["echo"]);
        let client = McpClient::with_connector(
            McpClientOptions::new(server_config(0).with_timeout_ms(20).unwrap()),
            FakeConnector::shared(&server),
        );
        client.connect().await.unwrap();
        server.set_request_delay(Duration::from_millis(200));

        let err = client.list_tools().await.expect_err("too slow");
        assert!(matches!(err, McpError::Timeout { operation, .. } if operation == "tools/list"));
    }

    #[tokio::test]
    async fn lost_transport_disconnects_without_reconnect() {
        let server = FakeServer::with_tools(&["echo"]);
        let client = client(&server, |o| o);
        client.connect().await.unwrap();
        server.fail_next("tools/list", Failure::Disconnect, 1);

        let err = client.list_tools().await.expect_err("transport lost");
        assert!(matches!(err, McpError::Transport { .. }));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(server.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lost_transport_reconnects_when_enabled() {
        let server = FakeServer::with_tools(&["echo"]);
        let client = client(&server, |o| o.with_reconnect_on_disconnect(true));
        client.connect().await.unwrap();
        server.fail_next("tools/list", Failure::Disconnect, 1);

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(server.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_doubles_to_cap() {
        let backoff = Backoff::default();
        let mut delay = backoff.initial();
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(delay.as_millis());
            delay = backoff.next(delay);
        }
        assert_eq!(seen, [200, 400, 800, 1600, 3200, 5000, 5000]);
    }
}
