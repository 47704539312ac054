/*!
JSON-RPC 2.0 tool server.

One dispatch core backs both transports: line-delimited stdio (default) and a
single HTTP POST route. Tool handler failures are reported inside the result
(`content` + `isError`), while unknown tools and bad parameters are JSON-RPC
errors.
*/

pub mod http;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::registry::{InvokeError, ToolRegistry};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError { code, message: message.into() }),
        }
    }
}

pub struct McpServer {
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Handle one raw input line. `None` means nothing should be written back
    /// (blank line or notification).
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let response = match serde_json::from_str::<Value>(line) {
            Ok(value) => self.handle_value(value).await?,
            Err(err) => {
                warn!(%err, "unparseable request");
                JsonRpcResponse::err(Value::Null, codes::PARSE_ERROR, "Parse error")
            }
        };
        // Serializing a response built from Value cannot fail.
        serde_json::to_string(&response).ok()
    }

    pub async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(err) => {
                warn!(%err, "malformed request object");
                return Some(JsonRpcResponse::err(
                    Value::Null,
                    codes::PARSE_ERROR,
                    "Parse error",
                ));
            }
        };
        let is_notification = request.id.is_none();
        let response = self.dispatch(request).await;
        if is_notification { None } else { Some(response) }
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);
        debug!(method = %request.method, "request");
        match request.method.as_str() {
            "initialize" => JsonRpcResponse::ok(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            ),
            "ping" => JsonRpcResponse::ok(id, json!({})),
            "tools/list" => JsonRpcResponse::ok(id, json!({ "tools": self.registry.list() })),
            "tools/call" => self.call_tool(id, request.params).await,
            "resources/list" => JsonRpcResponse::ok(id, json!({ "resources": [] })),
            "resources/templates/list" => {
                JsonRpcResponse::ok(id, json!({ "resourceTemplates": [] }))
            }
            "prompts/list" => JsonRpcResponse::ok(id, json!({ "prompts": [] })),
            method if method.starts_with("notifications/") => {
                debug!(%method, "notification");
                JsonRpcResponse::ok(id, json!({}))
            }
            other => JsonRpcResponse::err(
                id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ),
        }
    }

    async fn call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::err(id, codes::INVALID_PARAMS, "missing params");
        };
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::err(id, codes::INVALID_PARAMS, "missing tool name");
        };
        let arguments: Map<String, Value> = params
            .get("arguments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        match self.registry.invoke(name, arguments).await {
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                JsonRpcResponse::ok(
                    id,
                    json!({
                        "content": [{ "type": "text", "text": text }],
                        "isError": false,
                    }),
                )
            }
            Err(err @ (InvokeError::UnknownTool(_) | InvokeError::InvalidArguments(_))) => {
                JsonRpcResponse::err(id, codes::INVALID_PARAMS, err.to_string())
            }
            Err(err @ InvokeError::Upstream(_)) => {
                error!(tool = name, %err, "tool failed");
                JsonRpcResponse::ok(
                    id,
                    json!({
                        "content": [{ "type": "text", "text": err.to_string() }],
                        "isError": true,
                    }),
                )
            }
        }
    }
}

/// Serve requests from stdin, one JSON object per line, until EOF.
pub async fn run_stdio(server: McpServer) -> anyhow::Result<()> {
    info!(tools = server.registry.len(), "serving on stdio");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if let Some(reply) = server.handle_line(&line).await {
            stdout.write_all(reply.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }
    info!("stdin closed, shutting down");
    Ok(())
}
