//! JSON-RPC 2.0 envelopes and the MCP payloads the bridge uses.

use agent_primitives::CallId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{McpError, McpResult};

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision requested during `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// JSON-RPC error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Outgoing JSON-RPC request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Correlation id, unique per connection.
    pub id: u64,
    /// Method name.
    pub method: String,
    /// Optional parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a request envelope.
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Outgoing JSON-RPC notification (no id, no response).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Optional parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Creates a notification envelope.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
        }
    }
}

/// Incoming JSON-RPC response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version echoed by the server.
    #[serde(default)]
    pub jsonrpc: String,
    /// Id of the request this answers.
    #[serde(default)]
    pub id: Value,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Returns the numeric id, if the server sent one.
    #[must_use]
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.as_u64()
    }

    /// Splits the response into its result or an [`McpError::Rpc`].
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Rpc`] when the response carries an error object.
    pub fn into_result(self) -> McpResult<Value> {
        match self.error {
            Some(error) => Err(McpError::Rpc {
                code: error.code,
                message: error.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC error object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Message received from a server on a bidirectional transport.
#[derive(Debug)]
pub(crate) enum IncomingMessage {
    Response(JsonRpcResponse),
    /// A response whose id is usable but whose envelope is not.
    Malformed { id: u64, reason: String },
    Request { id: Value, method: String },
    Notification { method: String },
}

impl IncomingMessage {
    /// Classifies a raw frame: a `method` with an id is a server request, a
    /// `method` without one is a notification, the rest are responses.
    pub(crate) fn parse(frame: &str) -> McpResult<Self> {
        let raw: Value = serde_json::from_str(frame)
            .map_err(|err| McpError::protocol(format!("invalid JSON-RPC frame: {err}")))?;

        if let Some(method) = raw.get("method").and_then(Value::as_str) {
            let method = method.to_owned();
            return Ok(match raw.get("id") {
                Some(id) if !id.is_null() => Self::Request {
                    id: id.clone(),
                    method,
                },
                _ => Self::Notification { method },
            });
        }

        let id = raw.get("id").and_then(Value::as_u64);
        match (serde_json::from_value(raw), id) {
            (Ok(response), _) => Ok(Self::Response(response)),
            (Err(err), Some(id)) => Ok(Self::Malformed {
                id,
                reason: format!("invalid JSON-RPC response: {err}"),
            }),
            (Err(err), None) => Err(McpError::protocol(format!(
                "invalid JSON-RPC response: {err}"
            ))),
        }
    }
}

/// Builds the reply to a server-initiated request. The bridge exposes no
/// client capabilities, so only `ping` succeeds.
pub(crate) fn reply_to_server_request(id: Value, method: &str) -> JsonRpcResponse {
    let (result, error) = if method == "ping" {
        (Some(empty_object()), None)
    } else {
        (
            None,
            Some(JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("method `{method}` is not supported by this client"),
                data: None,
            }),
        )
    };
    JsonRpcResponse {
        jsonrpc: JSONRPC_VERSION.to_owned(),
        id,
        result,
        error,
    }
}

/// Identity reported by the server during the handshake.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server implementation name.
    #[serde(default)]
    pub name: String,
    /// Server implementation version.
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InitializeParams {
    pub(crate) protocol_version: &'static str,
    pub(crate) capabilities: Map<String, Value>,
    pub(crate) client_info: ServerInfo,
}

impl InitializeParams {
    pub(crate) fn for_this_client() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION,
            capabilities: Map::new(),
            client_info: ServerInfo {
                name: "agent-host".to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InitializeResult {
    #[serde(default)]
    pub(crate) protocol_version: String,
    #[serde(default)]
    pub(crate) server_info: ServerInfo,
}

/// Tool definition as advertised by `tools/list`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDefinition {
    /// Tool name, unique on the server.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the arguments object.
    #[serde(default = "empty_object")]
    pub input_schema: Value,
    /// JSON Schema of the structured result, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListToolsPage {
    #[serde(default)]
    pub(crate) tools: Vec<McpToolDefinition>,
    #[serde(default)]
    pub(crate) next_cursor: Option<String>,
}

/// Invocation payload for `tools/call`.
#[derive(Clone, Debug, PartialEq)]
pub struct McpToolCall {
    /// Remote tool name.
    pub tool: String,
    /// Arguments object.
    pub input: Value,
    /// Correlation id echoed into the result.
    pub call_id: Option<CallId>,
}

impl McpToolCall {
    /// Creates a call with a fresh correlation id.
    #[must_use]
    pub fn new(tool: impl Into<String>, input: Value) -> Self {
        Self {
            tool: tool.into(),
            input,
            call_id: Some(CallId::new()),
        }
    }

    /// Replaces the correlation id.
    #[must_use]
    pub fn with_call_id(mut self, call_id: Option<CallId>) -> Self {
        self.call_id = call_id;
        self
    }

    pub(crate) fn params(&self) -> Value {
        serde_json::json!({
            "name": self.tool,
            "arguments": self.input,
        })
    }
}

/// Outcome of a remote tool invocation.
///
/// A tool that ran but failed reports that through [`error`](Self::error);
/// check it before trusting [`output`](Self::output).
#[derive(Clone, Debug, PartialEq)]
pub struct McpToolResult {
    /// Correlation id of the originating call.
    pub call_id: Option<CallId>,
    /// Tool output.
    pub output: Value,
    /// Tool-level failure message.
    pub error: Option<String>,
}

impl McpToolResult {
    /// Returns the output, or the embedded error message if one is set.
    ///
    /// # Errors
    ///
    /// Returns the embedded error message when it is present and non-empty.
    pub fn into_output(self) -> Result<Value, String> {
        match self.error {
            Some(error) if !error.is_empty() => Err(error),
            _ => Ok(self.output),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CallToolResponse {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    structured_content: Option<Value>,
    #[serde(default)]
    is_error: bool,
}

impl CallToolResponse {
    pub(crate) fn into_tool_result(self, call_id: Option<CallId>) -> McpToolResult {
        let text = self
            .content
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>();
        let text = (!text.is_empty()).then(|| text.join("\n"));

        if self.is_error {
            let message = text
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| "remote tool reported an error".to_owned());
            return McpToolResult {
                call_id,
                output: self.structured_content.unwrap_or(Value::Null),
                error: Some(message),
            };
        }

        let output = match (self.structured_content, text) {
            (Some(structured), _) => structured,
            (None, Some(text)) => Value::String(text),
            (None, None) => Value::Array(self.content),
        };

        McpToolResult {
            call_id,
            output,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fold(raw: Value) -> McpToolResult {
        serde_json::from_value::<CallToolResponse>(raw)
            .unwrap()
            .into_tool_result(None)
    }

    #[test]
    fn request_serialises_compactly() {
        let request = JsonRpcRequest::new(7, "tools/list", None);
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#
        );
    }

    #[test]
    fn response_error_becomes_rpc_error() {
        let response: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32601, "message": "Method not found" }
        }))
        .unwrap();

        let err = response.into_result().expect_err("error response");
        assert!(matches!(err, McpError::Rpc { code: -32601, .. }));
    }

    #[test]
    fn classifies_frames() {
        let message = IncomingMessage::parse(r#"{"jsonrpc":"2.0","id":3,"result":{}}"#).unwrap();
        assert!(matches!(message, IncomingMessage::Response(r) if r.numeric_id() == Some(3)));

        let message = IncomingMessage::parse(
            r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#,
        )
        .unwrap();
        assert!(matches!(message, IncomingMessage::Notification { .. }));

        let message = IncomingMessage::parse(r#"{"jsonrpc":"2.0","id":"s-1","method":"ping"}"#)
            .unwrap();
        assert!(
            matches!(message, IncomingMessage::Request { id, method } if id == json!("s-1") && method == "ping")
        );

        let message = IncomingMessage::parse(r#"{"jsonrpc":"2.0","id":4,"error":"boom"}"#).unwrap();
        assert!(matches!(message, IncomingMessage::Malformed { id: 4, .. }));

        assert!(IncomingMessage::parse(r#"{"jsonrpc":"2.0","error":"boom"}"#).is_err());
        assert!(IncomingMessage::parse("not json").is_err());
    }

    #[test]
    fn server_requests_get_replies() {
        let pong = reply_to_server_request(json!(9), "ping");
        assert_eq!(
            serde_json::to_value(&pong).unwrap(),
            json!({ "jsonrpc": "2.0", "id": 9, "result": {} })
        );

        let refusal = reply_to_server_request(json!("s-2"), "sampling/createMessage");
        assert_eq!(refusal.id, json!("s-2"));
        assert_eq!(refusal.error.map(|e| e.code), Some(METHOD_NOT_FOUND));
        assert!(refusal.result.is_none());
    }

    #[test]
    fn tool_definition_defaults() {
        let definition: McpToolDefinition =
            serde_json::from_value(json!({ "name": "echo" })).unwrap();
        assert_eq!(definition.description, "");
        assert_eq!(definition.input_schema, json!({}));
        assert!(definition.output_schema.is_none());
    }

    #[test]
    fn structured_content_wins() {
        let result = fold(json!({
            "content": [{ "type": "text", "text": "{\"n\":1}" }],
            "structuredContent": { "n": 1 }
        }));
        assert_eq!(result.output, json!({ "n": 1 }));
        assert!(result.error.is_none());
    }

    #[test]
    fn text_content_is_joined() {
        let result = fold(json!({
            "content": [
                { "type": "text", "text": "first" },
                { "type": "image", "data": "..." },
                { "type": "text", "text": "second" }
            ]
        }));
        assert_eq!(result.output, json!("first\nsecond"));
    }

    #[test]
    fn non_text_content_passes_through() {
        let result = fold(json!({ "content": [{ "type": "image", "data": "abc" }] }));
        assert_eq!(result.output, json!([{ "type": "image", "data": "abc" }]));
    }

    #[test]
    fn is_error_fills_error() {
        let result = fold(json!({
            "content": [{ "type": "text", "text": "file not found" }],
            "isError": true
        }));
        assert_eq!(result.error.as_deref(), Some("file not found"));
        assert_eq!(result.into_output(), Err("file not found".to_owned()));
    }

    #[test]
    fn is_error_with_blank_text_still_fails() {
        let blanks = [
            json!([{ "type": "text", "text": "" }]),
            json!([{ "type": "text", "text": " \n" }]),
            json!([]),
        ];
        for content in blanks {
            let result = fold(json!({ "content": content, "isError": true }));
            assert_eq!(
                result.into_output(),
                Err("remote tool reported an error".to_owned())
            );
        }
    }

    #[test]
    fn empty_error_is_treated_as_absent() {
        let result = McpToolResult {
            call_id: None,
            output: json!(1),
            error: Some(String::new()),
        };
        assert_eq!(result.into_output(), Ok(json!(1)));
    }

    #[test]
    fn call_params_shape() {
        let call = McpToolCall::new("echo", json!({ "text": "hi" }));
        assert!(call.call_id.is_some());
        assert_eq!(
            call.params(),
            json!({ "name": "echo", "arguments": { "text": "hi" } })
        );
    }
}
