/*!
Chat-side catalog of connected MCP servers.

Each configured target is spawned (stdio child process) or dialed (HTTP
JSON-RPC) at startup; tools, prompts and resources advertised by every server
are merged into name -> connection routes. Invoking a name no server
advertises fails closed.
*/

pub mod target;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::{Context, Result, bail};
use rmcp::model::{CallToolRequestParam, GetPromptRequestParam, ReadResourceRequestParam};
use rmcp::service::RunningService;
use rmcp::{RoleClient, ServiceExt};
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

use self::target::TargetSpec;

/* ---- server configuration file ---- */

/// `server_config.json`: a map of server name to launch/dial instructions.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(rename = "mcpServers")]
    pub mcp_servers: std::collections::BTreeMap<String, ServerEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ServerEntry {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl ServerConfig {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read server config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid server config {}", path.display()))
    }

    /// Resolve entries into named targets. An entry must carry either a
    /// command or a url.
    pub fn targets(&self) -> Result<Vec<(String, TargetSpec)>> {
        let mut targets = Vec::new();
        for (name, entry) in &self.mcp_servers {
            let spec = match (&entry.command, &entry.url) {
                (Some(command), _) => {
                    let original = if entry.args.is_empty() {
                        command.clone()
                    } else {
                        format!("{command} {}", entry.args.join(" "))
                    };
                    TargetSpec::LocalCommand {
                        original,
                        program: command.clone(),
                        args: entry.args.clone(),
                    }
                }
                (None, Some(url)) => TargetSpec::HttpUrl {
                    original: url.clone(),
                    url: Url::parse(url)
                        .with_context(|| format!("server '{name}' has an invalid url"))?,
                },
                (None, None) => bail!("server '{name}' needs either a command or a url"),
            };
            targets.push((name.clone(), spec));
        }
        Ok(targets)
    }
}

/* ---- connections ---- */

enum Transport {
    Stdio(RunningService<RoleClient, ()>),
    Http {
        url: Url,
        http: reqwest::Client,
        next_id: AtomicI64,
    },
}

struct Connection {
    name: String,
    transport: Transport,
}

impl Connection {
    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        match &self.transport {
            Transport::Stdio(_) => bail!("rpc is only used for http connections"),
            Transport::Http { url, http, next_id } => {
                let id = next_id.fetch_add(1, Ordering::SeqCst);
                let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
                let response = http
                    .post(url.clone())
                    .json(&body)
                    .send()
                    .await
                    .with_context(|| format!("request to server '{}' failed", self.name))?;
                let value: Value = response
                    .json()
                    .await
                    .with_context(|| format!("server '{}' sent a malformed reply", self.name))?;
                if let Some(error) = value.get("error") {
                    bail!("server '{}' returned an error: {error}", self.name);
                }
                Ok(value.get("result").cloned().unwrap_or(Value::Null))
            }
        }
    }
}

pub struct ToolClient {
    connections: Vec<Connection>,
    tools: Vec<Value>,
    tool_routes: HashMap<String, usize>,
    prompts: Vec<Value>,
    prompt_routes: HashMap<String, usize>,
    resources: Vec<Value>,
    resource_routes: HashMap<String, usize>,
}

impl ToolClient {
    /// Connect to every target, list its tools (and prompts/resources where
    /// supported) and build the routing tables.
    pub async fn connect(targets: &[(String, TargetSpec)]) -> Result<Self> {
        let mut client = Self {
            connections: Vec::new(),
            tools: Vec::new(),
            tool_routes: HashMap::new(),
            prompts: Vec::new(),
            prompt_routes: HashMap::new(),
            resources: Vec::new(),
            resource_routes: HashMap::new(),
        };
        for (name, spec) in targets {
            client.add_connection(name, spec).await?;
        }
        Ok(client)
    }

    async fn add_connection(&mut self, name: &str, spec: &TargetSpec) -> Result<()> {
        let index = self.connections.len();
        match spec {
            TargetSpec::LocalCommand { program, args, .. } => {
                let service = ()
                    .serve(TokioChildProcess::new(Command::new(program).configure(
                        |c| {
                            for a in args {
                                c.arg(a);
                            }
                            // Keep stdout for the protocol, drop child stderr noise.
                            c.stderr(std::process::Stdio::null());
                        },
                    ))?)
                    .await
                    .with_context(|| format!("failed to spawn MCP server '{name}' ({spec})"))?;

                let tools_resp = service
                    .list_tools(Default::default())
                    .await
                    .with_context(|| format!("failed to list tools of server '{name}'"))?;
                let tools =
                    extract_tools(&serde_json::to_value(&tools_resp).unwrap_or(Value::Null));
                self.index_tools(index, name, tools);

                // Optional capabilities; a server without them is fine.
                if let Ok(resp) = service.list_prompts(Default::default()).await {
                    let value = serde_json::to_value(&resp).unwrap_or(Value::Null);
                    self.index_prompts(index, value.get("prompts"));
                }
                if let Ok(resp) = service.list_resources(Default::default()).await {
                    let value = serde_json::to_value(&resp).unwrap_or(Value::Null);
                    self.index_resources(index, value.get("resources"));
                }

                self.connections.push(Connection {
                    name: name.to_string(),
                    transport: Transport::Stdio(service),
                });
            }
            TargetSpec::HttpUrl { url, .. } => {
                let connection = Connection {
                    name: name.to_string(),
                    transport: Transport::Http {
                        url: url.clone(),
                        http: crate::api::http_client()?,
                        next_id: AtomicI64::new(1),
                    },
                };
                connection
                    .rpc("initialize", json!({ "protocolVersion": crate::server::PROTOCOL_VERSION }))
                    .await
                    .with_context(|| format!("failed to initialize server '{name}'"))?;
                let listed = connection.rpc("tools/list", json!({})).await?;
                self.index_tools(index, name, extract_tools(&listed));
                if let Ok(listed) = connection.rpc("prompts/list", json!({})).await {
                    self.index_prompts(index, listed.get("prompts"));
                }
                if let Ok(listed) = connection.rpc("resources/list", json!({})).await {
                    self.index_resources(index, listed.get("resources"));
                }
                self.connections.push(connection);
            }
        }
        Ok(())
    }

    fn index_tools(&mut self, index: usize, server: &str, tools: Vec<Value>) {
        info!(server, count = tools.len(), "connected to server");
        for tool in tools {
            if let Some(name) = tool.get("name").and_then(Value::as_str) {
                if let Some(previous) = self.tool_routes.insert(name.to_string(), index) {
                    warn!(
                        tool = name,
                        previous_server = previous,
                        "tool advertised by more than one server, using the latest"
                    );
                }
                self.tools.push(tool);
            }
        }
    }

    fn index_prompts(&mut self, index: usize, prompts: Option<&Value>) {
        let Some(prompts) = prompts.and_then(Value::as_array) else { return };
        for prompt in prompts {
            if let Some(name) = prompt.get("name").and_then(Value::as_str) {
                self.prompt_routes.insert(name.to_string(), index);
                self.prompts.push(prompt.clone());
            }
        }
    }

    fn index_resources(&mut self, index: usize, resources: Option<&Value>) {
        let Some(resources) = resources.and_then(Value::as_array) else { return };
        for resource in resources {
            if let Some(uri) = resource.get("uri").and_then(Value::as_str) {
                self.resource_routes.insert(uri.to_string(), index);
                self.resources.push(resource.clone());
            }
        }
    }

    pub fn tools(&self) -> &[Value] {
        &self.tools
    }

    pub fn server_count(&self) -> usize {
        self.connections.len()
    }

    pub fn prompts(&self) -> &[Value] {
        &self.prompts
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tool_routes.contains_key(name)
    }

    /// Call a tool by name. Unknown names fail closed.
    pub async fn call_tool(&self, name: &str, args: Map<String, Value>) -> Result<Value> {
        let Some(&index) = self.tool_routes.get(name) else {
            bail!("unknown tool: {name}");
        };
        let connection = &self.connections[index];
        debug!(tool = name, server = %connection.name, "calling tool");
        match &connection.transport {
            Transport::Stdio(service) => {
                let result = service
                    .call_tool(CallToolRequestParam {
                        name: name.to_string().into(),
                        arguments: if args.is_empty() { None } else { Some(args) },
                    })
                    .await
                    .with_context(|| format!("tool invocation failed: {name}"))?;
                Ok(serde_json::to_value(&result).unwrap_or(Value::Null))
            }
            Transport::Http { .. } => {
                connection
                    .rpc("tools/call", json!({ "name": name, "arguments": args }))
                    .await
            }
        }
    }

    pub async fn get_prompt(&self, name: &str, args: Map<String, Value>) -> Result<Value> {
        let Some(&index) = self.prompt_routes.get(name) else {
            bail!("unknown prompt: {name}");
        };
        let connection = &self.connections[index];
        match &connection.transport {
            Transport::Stdio(service) => {
                let result = service
                    .get_prompt(GetPromptRequestParam {
                        name: name.to_string().into(),
                        arguments: if args.is_empty() { None } else { Some(args) },
                    })
                    .await
                    .with_context(|| format!("prompt fetch failed: {name}"))?;
                Ok(serde_json::to_value(&result).unwrap_or(Value::Null))
            }
            Transport::Http { .. } => {
                connection
                    .rpc("prompts/get", json!({ "name": name, "arguments": args }))
                    .await
            }
        }
    }

    /// Read a resource by URI. Falls back to any server advertising the same
    /// URI scheme, which covers templated URIs like `papers://{topic}`.
    pub async fn read_resource(&self, uri: &str) -> Result<Value> {
        let index = match self.resource_routes.get(uri) {
            Some(&index) => index,
            None => {
                let scheme = uri.split("://").next().unwrap_or_default();
                self.resource_routes
                    .iter()
                    .find(|(known, _)| known.starts_with(scheme))
                    .map(|(_, &index)| index)
                    .ok_or_else(|| anyhow::anyhow!("no server provides resource {uri}"))?
            }
        };
        let connection = &self.connections[index];
        match &connection.transport {
            Transport::Stdio(service) => {
                let result = service
                    .read_resource(ReadResourceRequestParam {
                        uri: uri.to_string().into(),
                    })
                    .await
                    .with_context(|| format!("resource read failed: {uri}"))?;
                Ok(serde_json::to_value(&result).unwrap_or(Value::Null))
            }
            Transport::Http { .. } => {
                connection.rpc("resources/read", json!({ "uri": uri })).await
            }
        }
    }

    /// Descriptors in the shape the Anthropic Messages API expects.
    pub fn model_tool_descriptors(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.get("name"),
                    "description": tool.get("description").cloned().unwrap_or(json!("")),
                    "input_schema": tool
                        .get("inputSchema")
                        .or_else(|| tool.get("input_schema"))
                        .cloned()
                        .unwrap_or_else(|| json!({ "type": "object" })),
                })
            })
            .collect()
    }

    /// Graceful teardown of spawned child servers.
    pub async fn shutdown(self) {
        for connection in self.connections {
            if let Transport::Stdio(service) = connection.transport {
                let _ = service.cancel().await;
            }
        }
    }
}

/// Extract tool objects from a `tools/list` result, accepting both
/// `inputSchema` and `input_schema` producers.
pub fn extract_tools(value: &Value) -> Vec<Value> {
    value
        .get("tools")
        .and_then(Value::as_array)
        .map(|arr| arr.to_vec())
        .unwrap_or_default()
}

/// First text block of a tool-call result.
pub fn first_text(result: &Value) -> Option<&str> {
    result
        .get("content")?
        .as_array()?
        .iter()
        .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))?
        .get("text")?
        .as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn config_resolves_command_and_url_targets() {
        let raw = r#"{
            "mcpServers": {
                "seo": { "command": "mcp-seo", "args": ["serve"] },
                "remote": { "url": "http://localhost:3000/mcp" }
            }
        }"#;
        let config: ServerConfig = serde_json::from_str(raw).unwrap();
        let targets = config.targets().unwrap();
        assert_eq!(targets.len(), 2);
        let (name, spec) = &targets[1];
        assert_eq!(name, "seo");
        assert!(spec.is_local());
        assert!(!targets[0].1.is_local());
    }

    #[test]
    fn config_rejects_entry_without_command_or_url() {
        let raw = r#"{ "mcpServers": { "broken": {} } }"#;
        let config: ServerConfig = serde_json::from_str(raw).unwrap();
        assert!(config.targets().is_err());
    }

    #[test]
    fn config_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "mcpServers": {{ "seo": {{ "command": "mcp-seo", "args": ["serve"] }} }} }}"#
        )
        .unwrap();
        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.mcp_servers.len(), 1);
    }

    #[test]
    fn extract_tools_accepts_missing_list() {
        assert!(extract_tools(&json!({})).is_empty());
        let tools = extract_tools(&json!({ "tools": [{ "name": "a" }] }));
        assert_eq!(tools.len(), 1);
    }

    #[test]
    fn first_text_finds_text_block() {
        let result = json!({
            "content": [
                { "type": "image", "data": "…" },
                { "type": "text", "text": "hello" }
            ]
        });
        assert_eq!(first_text(&result), Some("hello"));
        assert_eq!(first_text(&json!({ "content": [] })), None);
    }
}
