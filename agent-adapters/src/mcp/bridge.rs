use std::sync::Arc;

use agent_config::McpServerConfig;
use agent_primitives::{SecurityLevel, ToolTag};
use agent_tools::registry::{Tool, ToolDescriptor, ToolError, ToolRegistry, ToolResult};
use agent_tools::schema::ToolSchema;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::client::{McpClient, McpClientOptions};
use super::error::{McpError, McpResult};
use super::protocol::{McpToolCall, McpToolDefinition};
use super::transport::{DefaultConnector, TransportConnector};

/// Version string stamped on every bridged descriptor.
pub const MCP_TOOL_VERSION: &str = "mcp";

/// Publishes the tools of one MCP server into a [`ToolRegistry`].
///
/// Bridged descriptors are always [`SecurityLevel::Network`], carry only the
/// [`ToolTag::Mcp`] tag, and keep the advertised schemas as opaque payloads.
/// Re-syncing overwrites entries by name; tools that vanished from the
/// server stay registered until overwritten or the registry is rebuilt.
#[derive(Debug, Clone)]
pub struct McpToolBridge {
    client: Arc<McpClient>,
    registry: Arc<ToolRegistry>,
}

impl McpToolBridge {
    /// Binds a client to the registry it populates.
    #[must_use]
    pub fn new(client: Arc<McpClient>, registry: Arc<ToolRegistry>) -> Self {
        Self { client, registry }
    }

    /// Client the bridge forwards calls to.
    #[must_use]
    pub const fn client(&self) -> &Arc<McpClient> {
        &self.client
    }

    /// Lists the server's tools and registers one descriptor per tool.
    ///
    /// Returns the number of descriptors registered.
    ///
    /// # Errors
    ///
    /// Propagates [`McpClient::list_tools`] failures, and returns
    /// [`McpError::Protocol`] if the server advertises a tool without a name.
    pub async fn sync_tools(&self) -> McpResult<usize> {
        let definitions = self.client.list_tools().await?;
        let count = definitions.len();
        for definition in definitions {
            let descriptor = self.adapt(definition)?;
            self.registry.register(descriptor);
        }

        info!(server = %self.client.server(), tools = count, "MCP tools synchronised");
        Ok(count)
    }

    fn adapt(&self, definition: McpToolDefinition) -> McpResult<ToolDescriptor> {
        let output_schema = definition
            .output_schema
            .unwrap_or_else(|| Value::Object(Map::new()));
        let remote = RemoteTool {
            client: Arc::clone(&self.client),
            name: definition.name.clone(),
        };

        ToolDescriptor::builder(definition.name, MCP_TOOL_VERSION)
            .description(definition.description)
            .tag(ToolTag::Mcp)
            .security_level(SecurityLevel::Network)
            .input_schema(ToolSchema::opaque(definition.input_schema))
            .output_schema(ToolSchema::opaque(output_schema))
            .build(remote)
            .map_err(|err| McpError::protocol(format!("unusable tool definition: {err}")))
    }
}

struct RemoteTool {
    client: Arc<McpClient>,
    name: String,
}

#[async_trait]
impl Tool for RemoteTool {
    async fn invoke(&self, input: Value) -> ToolResult<Value> {
        let call = McpToolCall::new(&self.name, input);
        let call_id = call.call_id.map(|id| id.to_string()).unwrap_or_default();
        debug!(server = %self.client.server(), tool = %self.name, %call_id, "calling remote tool");

        let result = self
            .client
            .call_tool(call)
            .await
            .map_err(|err| ToolError::execution(err.to_string()))?;

        result.into_output().map_err(|reason| {
            debug!(server = %self.client.server(), tool = %self.name, %call_id, %reason, "remote tool failed");
            ToolError::execution(reason)
        })
    }
}

/// Connects every configured server and bridges its tools into `registry`.
///
/// Servers that fail to connect or sync are logged and skipped. Returns the
/// clients that are connected and synced, in configuration order.
pub async fn connect_all(
    configs: impl IntoIterator<Item = McpServerConfig>,
    registry: &Arc<ToolRegistry>,
) -> Vec<Arc<McpClient>> {
    connect_all_with(configs, registry, Arc::new(DefaultConnector)).await
}

/// [`connect_all`] with a custom transport connector.
pub async fn connect_all_with(
    configs: impl IntoIterator<Item = McpServerConfig>,
    registry: &Arc<ToolRegistry>,
    connector: Arc<dyn TransportConnector>,
) -> Vec<Arc<McpClient>> {
    let mut connected = Vec::new();
    for config in configs {
        let client = Arc::new(McpClient::with_connector(
            McpClientOptions::new(config),
            Arc::clone(&connector),
        ));

        if let Err(err) = client.connect().await {
            warn!(server = %client.server(), error = %err, "skipping MCP server");
            continue;
        }

        let bridge = McpToolBridge::new(Arc::clone(&client), Arc::clone(registry));
        match bridge.sync_tools().await {
            Ok(_) => connected.push(client),
            Err(err) => {
                warn!(server = %client.server(), error = %err, "skipping MCP server");
                client.disconnect().await;
            }
        }
    }
    connected
}
