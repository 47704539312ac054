/*!
Tool registry: descriptors plus async handlers keyed by tool name.

Registration validates the descriptor (object schema, known parameter types)
and applies a duplicate-name policy. Invocation validates the arguments
against the declared schema before the handler runs, so handlers can assume
required parameters are present and coercible.
*/

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value, json};
use tracing::debug;

pub type ToolFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;
pub type ToolHandler = Box<dyn Fn(Map<String, Value>) -> ToolFuture + Send + Sync>;

/// Descriptor advertised over `tools/list`.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of type `object` describing the arguments.
    pub input_schema: Value,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }

    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

/// What to do when a tool name is registered twice.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DuplicatePolicy {
    Overwrite,
    Reject,
}

#[derive(Debug)]
pub enum InvokeError {
    UnknownTool(String),
    InvalidArguments(String),
    Upstream(anyhow::Error),
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTool(name) => write!(f, "unknown tool: {name}"),
            Self::InvalidArguments(msg) => write!(f, "invalid arguments: {msg}"),
            Self::Upstream(err) => write!(f, "tool execution failed: {err:#}"),
        }
    }
}

impl std::error::Error for InvokeError {}

pub struct ToolRegistry {
    policy: DuplicatePolicy,
    /// Registration order, for stable `list()` output.
    order: Vec<String>,
    entries: HashMap<String, (ToolSpec, ToolHandler)>,
}

impl ToolRegistry {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, spec: ToolSpec, handler: ToolHandler) -> anyhow::Result<()> {
        validate_schema(&spec)?;
        if self.entries.contains_key(&spec.name) {
            match self.policy {
                DuplicatePolicy::Reject => {
                    anyhow::bail!("tool '{}' is already registered", spec.name)
                }
                DuplicatePolicy::Overwrite => {
                    debug!(tool = %spec.name, "overwriting registered tool");
                }
            }
        } else {
            self.order.push(spec.name.clone());
        }
        self.entries.insert(spec.name.clone(), (spec, handler));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Descriptors in registration order.
    pub fn list(&self) -> Vec<Value> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|(spec, _)| spec.descriptor())
            .collect()
    }

    pub async fn invoke(
        &self,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<Value, InvokeError> {
        let (spec, handler) = self
            .entries
            .get(name)
            .ok_or_else(|| InvokeError::UnknownTool(name.to_string()))?;
        validate_arguments(&spec.input_schema, &args)
            .map_err(InvokeError::InvalidArguments)?;
        debug!(tool = name, "invoking tool");
        handler(args).await.map_err(InvokeError::Upstream)
    }
}

/* ---- schema validation ---- */

const KNOWN_TYPES: &[&str] = &["string", "integer", "number", "boolean", "array", "object"];

fn validate_schema(spec: &ToolSpec) -> anyhow::Result<()> {
    let schema = spec
        .input_schema
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("tool '{}': input schema is not an object", spec.name))?;
    if schema.get("type").and_then(Value::as_str) != Some("object") {
        anyhow::bail!("tool '{}': input schema type must be 'object'", spec.name);
    }
    if let Some(props) = schema.get("properties") {
        let props = props
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("tool '{}': properties is not an object", spec.name))?;
        for (prop, def) in props {
            let ty = def.get("type").and_then(Value::as_str).unwrap_or("string");
            if !KNOWN_TYPES.contains(&ty) {
                anyhow::bail!(
                    "tool '{}': parameter '{prop}' has unknown type '{ty}'",
                    spec.name
                );
            }
        }
    }
    Ok(())
}

/// Check required fields and per-field type coercibility. String renderings of
/// numbers and booleans are accepted since callers often pass everything as
/// text.
pub fn validate_arguments(schema: &Value, args: &Map<String, Value>) -> Result<(), String> {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(field) {
                return Err(format!("missing required parameter '{field}'"));
            }
        }
    }
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (key, value) in args {
        let Some(def) = props.get(key) else { continue };
        let ty = def.get("type").and_then(Value::as_str).unwrap_or("string");
        if !matches_type(value, ty) {
            return Err(format!("parameter '{key}' is not a valid {ty}"));
        }
    }
    Ok(())
}

fn matches_type(value: &Value, ty: &str) -> bool {
    match ty {
        "string" => value.is_string(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value
                    .as_str()
                    .is_some_and(|s| s.trim().parse::<i64>().is_ok())
        }
        "number" => {
            value.is_number()
                || value
                    .as_str()
                    .is_some_and(|s| s.trim().parse::<f64>().is_ok())
        }
        "boolean" => {
            value.is_boolean()
                || value
                    .as_str()
                    .is_some_and(|s| matches!(s.trim(), "true" | "false"))
        }
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}
