//! Scripted in-memory MCP server for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_config::{McpServerConfig, McpTransportKind};
use async_trait::async_trait;
use serde_json::{Value, json};

use super::error::{McpError, McpResult};
use super::transport::{Transport, TransportConnector};

#[derive(Clone, Copy, Debug)]
pub(crate) enum Failure {
    Transport,
    Rpc,
    Disconnect,
}

#[derive(Default)]
pub(crate) struct FakeServer {
    pub(crate) opens: AtomicUsize,
    pub(crate) requests: AtomicUsize,
    tools: Mutex<Vec<String>>,
    methods: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, (Failure, usize)>>,
    open_failures: AtomicUsize,
    page_size: Mutex<Option<usize>>,
    stuck_cursor: Mutex<Option<String>>,
    open_delay: Mutex<Duration>,
    request_delay: Mutex<Duration>,
}

pub(crate) fn server_config(max_retries: u32) -> McpServerConfig {
    McpServerConfig::new("fake", McpTransportKind::Stdio, "fake-mcp")
        .unwrap()
        .with_max_retries(max_retries)
}

impl FakeServer {
    pub(crate) fn with_tools(names: &[&str]) -> Arc<Self> {
        let server = Self::default();
        server.set_tools(names);
        Arc::new(server)
    }

    pub(crate) fn set_tools(&self, names: &[&str]) {
        *self.tools.lock().unwrap() = names.iter().map(|name| (*name).to_owned()).collect();
    }

    pub(crate) fn set_page_size(&self, size: usize) {
        *self.page_size.lock().unwrap() = Some(size);
    }

    pub(crate) fn set_stuck_cursor(&self, cursor: &str) {
        *self.stuck_cursor.lock().unwrap() = Some(cursor.to_owned());
    }

    pub(crate) fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock().unwrap() = delay;
    }

    pub(crate) fn set_request_delay(&self, delay: Duration) {
        *self.request_delay.lock().unwrap() = delay;
    }

    pub(crate) fn fail_opens(&self, count: usize) {
        self.open_failures.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_next(&self, method: &str, failure: Failure, count: usize) {
        self.failures
            .lock()
            .unwrap()
            .insert(method.to_owned(), (failure, count));
    }

    pub(crate) fn method_count(&self, method: &str) -> usize {
        self.methods
            .lock()
            .unwrap()
            .iter()
            .filter(|seen| *seen == method)
            .count()
    }

    fn record(&self, method: &str) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.methods.lock().unwrap().push(method.to_owned());
    }

    fn take_failure(&self, method: &str) -> Option<Failure> {
        let mut failures = self.failures.lock().unwrap();
        let (failure, remaining) = failures.get_mut(method)?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(*failure)
    }

    fn answer(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": "2025-06-18",
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "fake-server", "version": "0.0.1" }
            })),
            "tools/list" => {
                let tools = self.tools.lock().unwrap().clone();
                let start = params
                    .as_ref()
                    .and_then(|p| p.get("cursor"))
                    .and_then(Value::as_str)
                    .and_then(|cursor| cursor.parse::<usize>().ok())
                    .unwrap_or(0);
                let size = self.page_size.lock().unwrap().unwrap_or(tools.len());
                let end = (start + size).min(tools.len());
                let page: Vec<_> = tools[start..end]
                    .iter()
                    .map(|name| {
                        json!({
                            "name": name,
                            "description": format!("remote {name}"),
                            "inputSchema": { "type": "object" }
                        })
                    })
                    .collect();
                let mut result = json!({ "tools": page });
                if let Some(stuck) = self.stuck_cursor.lock().unwrap().clone() {
                    result["nextCursor"] = json!(stuck);
                } else if end < tools.len() {
                    result["nextCursor"] = json!(end.to_string());
                }
                Ok(result)
            }
            "tools/call" => {
                let params = params.unwrap_or(Value::Null);
                let name = params["name"].as_str().unwrap_or_default().to_owned();
                let arguments = params["arguments"].clone();
                if !self.tools.lock().unwrap().contains(&name) {
                    return Ok(json!({
                        "content": [{ "type": "text", "text": format!("unknown tool {name}") }],
                        "isError": true
                    }));
                }
                Ok(match arguments.get("text").and_then(Value::as_str) {
                    Some(text) => json!({ "content": [{ "type": "text", "text": text }] }),
                    None => json!({ "content": [], "structuredContent": arguments }),
                })
            }
            other => Err(McpError::Rpc {
                code: -32601,
                message: format!("method {other} not found"),
            }),
        }
    }
}

pub(crate) struct FakeConnector {
    server: Arc<FakeServer>,
}

impl FakeConnector {
    pub(crate) fn shared(server: &Arc<FakeServer>) -> Arc<dyn TransportConnector> {
        Arc::new(Self {
            server: Arc::clone(server),
        })
    }
}

#[async_trait]
impl TransportConnector for FakeConnector {
    async fn open(&self, config: &McpServerConfig) -> McpResult<Arc<dyn Transport>> {
        self.server.opens.fetch_add(1, Ordering::SeqCst);
        let delay = *self.server.open_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        let pending_failures = self.server.open_failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.server
                .open_failures
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(McpError::Connection {
                server: config.name().to_owned(),
                reason: "connection refused".into(),
            });
        }

        Ok(Arc::new(FakeTransport {
            server: Arc::clone(&self.server),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeTransport {
    server: Arc<FakeServer>,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        self.server.record(method);
        let delay = *self.server.request_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        if self.is_closed() {
            return Err(McpError::transport("closed"));
        }
        match self.server.take_failure(method) {
            Some(Failure::Transport) => Err(McpError::transport("connection reset")),
            Some(Failure::Rpc) => Err(McpError::Rpc {
                code: -32603,
                message: "internal error".into(),
            }),
            Some(Failure::Disconnect) => {
                self.closed.store(true, Ordering::SeqCst);
                Err(McpError::transport("server went away"))
            }
            None => self.server.answer(method, params),
        }
    }

    async fn notify(&self, method: &str, _params: Option<Value>) -> McpResult<()> {
        self.server.record(method);
        if self.is_closed() {
            return Err(McpError::transport("closed"));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
