use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_host::adapters::mcp::transport::{Transport, TransportConnector};
use agent_host::adapters::mcp::{
    Backoff, ConnectionState, McpClient, McpClientOptions, McpError, McpResult, McpToolBridge,
    McpToolCall, connect_all_with,
};
use agent_host::config::{McpServerConfig, McpTransportKind};
use agent_host::primitives::{SecurityLevel, ToolTag};
use agent_host::telemetry::tracing_support;
use agent_host::tools::registry::{ToolDescriptor, ToolError, ToolRegistry};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Scripted in-process server speaking the three operations the bridge needs.
#[derive(Default)]
struct ScriptedServer {
    tools: Mutex<Vec<Value>>,
    requests: AtomicUsize,
    opens: AtomicUsize,
}

impl ScriptedServer {
    fn new(tools: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            tools: Mutex::new(tools),
            ..Self::default()
        })
    }
}

struct ScriptedTransport {
    server: Arc<ScriptedServer>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        self.server.requests.fetch_add(1, Ordering::SeqCst);
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": "2025-06-18",
                "serverInfo": { "name": "scripted", "version": "1.2.3" }
            })),
            "tools/list" => {
                let tools = self.server.tools.lock().unwrap().clone();
                Ok(json!({ "tools": tools }))
            }
            "tools/call" => {
                let params = params.unwrap_or_default();
                let arguments = params["arguments"].clone();
                match params["name"].as_str() {
                    Some("divide") => {
                        let (a, b) = (arguments["a"].as_f64(), arguments["b"].as_f64());
                        match (a, b) {
                            (Some(_), Some(b)) if b == 0.0 => Ok(json!({
                                "content": [{ "type": "text", "text": "division by zero" }],
                                "isError": true
                            })),
                            (Some(a), Some(b)) => Ok(json!({
                                "content": [],
                                "structuredContent": { "quotient": a / b }
                            })),
                            _ => Err(McpError::Rpc {
                                code: -32602,
                                message: "invalid params".into(),
                            }),
                        }
                    }
                    Some("greet") => {
                        let who = arguments["who"].as_str().unwrap_or("?");
                        Ok(json!({ "content": [{ "type": "text", "text": format!("hello {who}") }] }))
                    }
                    _ => Err(McpError::Rpc {
                        code: -32601,
                        message: "unknown tool".into(),
                    }),
                }
            }
            other => Err(McpError::protocol(format!("unexpected method {other}"))),
        }
    }

    async fn notify(&self, _method: &str, _params: Option<Value>) -> McpResult<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }

    async fn close(&self) {}
}

struct ScriptedConnector(Arc<ScriptedServer>);

#[async_trait]
impl TransportConnector for ScriptedConnector {
    async fn open(&self, _config: &McpServerConfig) -> McpResult<Arc<dyn Transport>> {
        self.0.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedTransport {
            server: Arc::clone(&self.0),
        }))
    }
}

fn tool(name: &str, description: &str) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": { "type": "object", "properties": { "a": { "type": "number" } } }
    })
}

fn config(name: &str) -> McpServerConfig {
    McpServerConfig::new(name, McpTransportKind::Stdio, "scripted-mcp")
        .unwrap()
        .with_max_retries(0)
}

fn client(server: &Arc<ScriptedServer>) -> Arc<McpClient> {
    let options = McpClientOptions::new(config("scripted"))
        .with_backoff(Backoff::new(Duration::from_millis(1), Duration::from_millis(1)));
    Arc::new(McpClient::with_connector(
        options,
        Arc::new(ScriptedConnector(Arc::clone(server))),
    ))
}

fn snapshot(registry: &ToolRegistry) -> Vec<(String, String, String, SecurityLevel, Value)> {
    registry
        .list()
        .iter()
        .map(|d| {
            (
                d.name().to_owned(),
                d.description().to_owned(),
                d.version().to_owned(),
                d.security_level(),
                d.input_schema().raw().clone(),
            )
        })
        .collect()
}

#[tokio::test]
async fn list_tools_while_disconnected_performs_no_io() {
    let server = ScriptedServer::new(vec![tool("divide", "")]);
    let client = client(&server);

    let err = client.list_tools().await.expect_err("not connected");
    assert!(matches!(err, McpError::NotConnected { .. }));
    let err = client
        .call_tool(McpToolCall::new("divide", json!({})))
        .await
        .expect_err("not connected");
    assert!(matches!(err, McpError::NotConnected { .. }));

    assert_eq!(server.opens.load(Ordering::SeqCst), 0);
    assert_eq!(server.requests.load(Ordering::SeqCst), 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn bridged_tools_behave_like_local_ones() {
    tracing_support::try_init_for_tests();
    let server = ScriptedServer::new(vec![
        tool("divide", "Divides a by b"),
        tool("greet", "Says hi"),
    ]);
    let registry = Arc::new(ToolRegistry::new());
    registry.register(
        ToolDescriptor::builder("local-echo", "1.0.0")
            .build(|input: Value| async move { Ok::<_, ToolError>(input) })
            .unwrap(),
    );

    let client = client(&server);
    client.connect().await.unwrap();
    assert_eq!(client.server_info().unwrap().name, "scripted");
    let synced = McpToolBridge::new(Arc::clone(&client), Arc::clone(&registry))
        .sync_tools()
        .await
        .unwrap();
    assert_eq!(synced, 2);

    assert_eq!(registry.names(), ["local-echo", "divide", "greet"]);
    let mcp: Vec<_> = registry
        .find_by_tag(ToolTag::Mcp)
        .iter()
        .map(|d| d.name().to_owned())
        .collect();
    assert_eq!(mcp, ["divide", "greet"]);
    assert_eq!(registry.find_by_security(SecurityLevel::Network).len(), 2);
    assert_eq!(registry.permitted(SecurityLevel::Sandboxed).len(), 1);

    let quotient = registry
        .invoke("divide", json!({ "a": 9, "b": 3 }))
        .await
        .unwrap();
    assert_eq!(quotient, json!({ "quotient": 3.0 }));

    let greeting = registry.invoke("greet", json!({ "who": "ada" })).await.unwrap();
    assert_eq!(greeting, json!("hello ada"));
}

#[tokio::test]
async fn remote_failures_surface_as_raised_errors() {
    let server = ScriptedServer::new(vec![tool("divide", "")]);
    let registry = Arc::new(ToolRegistry::new());
    let client = client(&server);
    client.connect().await.unwrap();
    McpToolBridge::new(Arc::clone(&client), Arc::clone(&registry))
        .sync_tools()
        .await
        .unwrap();

    // Tool-level failure is data on the client side...
    let raw = client
        .call_tool(McpToolCall::new("divide", json!({ "a": 1, "b": 0 })))
        .await
        .unwrap();
    assert_eq!(raw.error.as_deref(), Some("division by zero"));

    // ...and a raised failure through the registry.
    let err = registry
        .invoke("divide", json!({ "a": 1, "b": 0 }))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Execution { reason } if reason == "division by zero"));

    let err = registry.invoke("divide", json!({ "a": "x" })).await.unwrap_err();
    assert!(matches!(err, ToolError::Execution { reason } if reason.contains("invalid params")));
}

#[tokio::test]
async fn resync_is_idempotent_and_keeps_vanished_tools() {
    let server = ScriptedServer::new(vec![tool("divide", "v1"), tool("greet", "v1")]);
    let registry = Arc::new(ToolRegistry::new());
    let client = client(&server);
    client.connect().await.unwrap();
    let bridge = McpToolBridge::new(Arc::clone(&client), Arc::clone(&registry));

    bridge.sync_tools().await.unwrap();
    let first = snapshot(&registry);
    bridge.sync_tools().await.unwrap();
    assert_eq!(snapshot(&registry), first);

    *server.tools.lock().unwrap() = vec![tool("divide", "v2")];
    bridge.sync_tools().await.unwrap();
    assert_eq!(registry.find("divide").unwrap().description(), "v2");
    assert_eq!(registry.find("greet").unwrap().description(), "v1");
    assert_eq!(registry.names(), ["divide", "greet"]);
}

#[tokio::test]
async fn connect_all_bootstraps_each_server() {
    let server = ScriptedServer::new(vec![tool("divide", "")]);
    let registry = Arc::new(ToolRegistry::new());

    let clients = connect_all_with(
        [config("alpha"), config("beta")],
        &registry,
        Arc::new(ScriptedConnector(Arc::clone(&server))),
    )
    .await;

    assert_eq!(clients.len(), 2);
    assert!(clients.iter().all(|c| c.is_connected()));
    assert_eq!(server.opens.load(Ordering::SeqCst), 2);
    assert_eq!(registry.len(), 1);

    for client in &clients {
        client.disconnect().await;
        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
