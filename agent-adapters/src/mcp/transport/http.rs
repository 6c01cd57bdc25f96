use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use agent_config::McpServerConfig;
use async_trait::async_trait;
use hyper::body::to_bytes;
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, Uri};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::Transport;
use crate::http_client::{HyperClient, USER_AGENT, build_https_client};
use crate::mcp::error::{McpError, McpResult};
use crate::mcp::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

const SESSION_HEADER: &str = "mcp-session-id";
const EVENT_STREAM: &str = "text/event-stream";

/// JSON-RPC over HTTP POST, one request per exchange.
///
/// The session id issued by the server on `initialize` is echoed on every
/// later request. Replies may be plain JSON or a server-sent event stream.
pub struct HttpTransport {
    server: String,
    endpoint: Uri,
    auth_token: Option<String>,
    client: HyperClient,
    session: Mutex<Option<String>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("server", &self.server)
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Prepares a client for `config.endpoint()`. No request is sent until
    /// the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Connection`] if the endpoint is not a valid URI or
    /// the HTTPS client cannot be built.
    pub fn new(config: &McpServerConfig) -> McpResult<Self> {
        let server = config.name().to_owned();
        let endpoint = config.endpoint().parse::<Uri>().map_err(|err| McpError::Connection {
            server: server.clone(),
            reason: format!("invalid HTTP endpoint: {err}"),
        })?;
        let client = build_https_client().map_err(|err| McpError::Connection {
            server: server.clone(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            server,
            endpoint,
            auth_token: config.auth_token().map(str::to_owned),
            client,
            session: Mutex::new(None),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    fn session(&self) -> Option<String> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn build(&self, method: Method, body: Body) -> McpResult<Request<Body>> {
        let mut builder = Request::builder()
            .method(method)
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .header(hyper::header::USER_AGENT, USER_AGENT);
        if let Some(token) = &self.auth_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(session) = self.session() {
            builder = builder.header(SESSION_HEADER, session);
        }
        builder
            .body(body)
            .map_err(|err| McpError::protocol(format!("failed to build HTTP request: {err}")))
    }

    async fn post(&self, message: &impl Serialize) -> McpResult<Response<Body>> {
        if self.is_closed() {
            return Err(McpError::transport(format!(
                "connection to `{}` is closed",
                self.server
            )));
        }

        let body = serde_json::to_vec(message)
            .map_err(|err| McpError::protocol(format!("failed to encode request: {err}")))?;
        let request = self.build(Method::POST, Body::from(body))?;
        let response = self.client.request(request).await.map_err(|err| {
            McpError::transport(format!("HTTP request to `{}` failed: {err}", self.server))
        })?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.to_owned());
        }

        let status = response.status();
        if status.is_server_error() {
            return Err(McpError::transport(format!(
                "`{}` returned {status}",
                self.server
            )));
        }
        if !status.is_success() {
            return Err(McpError::protocol(format!(
                "`{}` returned {status}",
                self.server
            )));
        }
        Ok(response)
    }
}

/// Extracts the `data:` payload of every event in a server-sent event body.
pub(crate) fn event_stream_payloads(body: &str) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in body.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            if !current.is_empty() {
                payloads.push(current.join("\n"));
                current.clear();
            }
        } else if let Some(data) = line.strip_prefix("data:") {
            current.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }
    if !current.is_empty() {
        payloads.push(current.join("\n"));
    }
    payloads
}

fn find_response(body: &str, is_event_stream: bool, id: u64) -> McpResult<JsonRpcResponse> {
    if !is_event_stream {
        return serde_json::from_str(body)
            .map_err(|err| McpError::protocol(format!("invalid JSON-RPC response: {err}")));
    }

    event_stream_payloads(body)
        .iter()
        .filter_map(|payload| serde_json::from_str::<JsonRpcResponse>(payload).ok())
        .find(|response| response.numeric_id() == Some(id))
        .ok_or_else(|| McpError::protocol(format!("event stream carried no response to request {id}")))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self.post(&JsonRpcRequest::new(id, method, params)).await?;

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with(EVENT_STREAM));
        let bytes = to_bytes(response.into_body()).await.map_err(|err| {
            McpError::transport(format!("failed to read response from `{}`: {err}", self.server))
        })?;
        let body = std::str::from_utf8(&bytes)
            .map_err(|err| McpError::protocol(format!("response is not UTF-8: {err}")))?;

        find_response(body, is_event_stream, id)?.into_result()
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.post(&JsonRpcNotification::new(method, params)).await?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.session().is_none() {
            return;
        }
        if let Ok(request) = self.build(Method::DELETE, Body::empty()) {
            let outcome = self.client.request(request).await;
            debug!(server = %self.server, ok = outcome.is_ok(), "MCP HTTP session ended");
        }
    }
}
