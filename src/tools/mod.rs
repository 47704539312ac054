/*!
SEO tool definitions: descriptor + handler pairs for the registry.

Handlers shape provider responses into `{"status": ...}` envelopes. A missing
credential or a provider-reported error becomes an error envelope so the
caller sees the provider's message; only transport failures bubble up as
errors to the server layer.
*/

pub mod ahrefs;
pub mod topvisor;

use anyhow::Result;
use serde_json::{Map, Value, json};

use crate::registry::{DuplicatePolicy, ToolRegistry};

/// Build the full registry served by `mcp-seo serve`. Duplicate names are a
/// startup error.
pub fn build_registry() -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new(DuplicatePolicy::Reject);
    topvisor::register(&mut registry)?;
    ahrefs::register(&mut registry)?;
    Ok(registry)
}

pub(crate) fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/* ---- argument extraction ----
The registry has already checked presence and coercibility, so these helpers
only convert; `require_*` still reports a readable message on the direct-call
path where no registry sits in front. */

pub(crate) fn require_i64(args: &Map<String, Value>, key: &str) -> Result<i64> {
    opt_i64(args, key).ok_or_else(|| anyhow::anyhow!("missing required parameter '{key}'"))
}

pub(crate) fn opt_i64(args: &Map<String, Value>, key: &str) -> Option<i64> {
    match args.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn opt_u32(args: &Map<String, Value>, key: &str) -> Option<u32> {
    opt_i64(args, key).and_then(|n| u32::try_from(n).ok())
}

pub(crate) fn require_str(args: &Map<String, Value>, key: &str) -> Result<String> {
    opt_str(args, key).ok_or_else(|| anyhow::anyhow!("missing required parameter '{key}'"))
}

pub(crate) fn opt_str(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

pub(crate) fn opt_string_array(args: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    let items = args.get(key)?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
    )
}

/// Error envelope for a configuration problem (missing credential).
pub(crate) fn config_error(err: &anyhow::Error, help: &str) -> Value {
    json!({
        "status": "error",
        "message": format!("{err:#}"),
        "help": help,
    })
}
