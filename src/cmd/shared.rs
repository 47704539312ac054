/*!
Shared helpers for subcommands.

Focus:
  - resolve_target: CLI flag > MCP_TARGET env > spawning our own serve
  - parse_kv_params / load_param_file: raw string parameters
  - build_arguments + primitive coercion against a tool schema
*/

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::client::target::{TargetSpec, parse_target};

/// Resolve the server target for `tools` / `call`: explicit flag first, then
/// the MCP_TARGET environment variable, then our own `serve` subcommand.
pub fn resolve_target(flag: Option<String>) -> Result<TargetSpec> {
    let raw = flag.or_else(|| {
        std::env::var("MCP_TARGET")
            .ok()
            .filter(|s| !s.trim().is_empty())
    });
    match raw {
        Some(raw) => parse_target(&raw),
        None => self_serve_target(),
    }
}

/// Target that spawns this very binary with `serve` over stdio.
pub fn self_serve_target() -> Result<TargetSpec> {
    let exe = std::env::current_exe().context("cannot locate the current executable")?;
    let program = exe.to_string_lossy().to_string();
    Ok(TargetSpec::LocalCommand {
        original: format!("{program} serve"),
        program,
        args: vec!["serve".into()],
    })
}

/// Parse repeatable `--param key=value` flags.
pub fn parse_kv_params(params: &[String]) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for pair in params {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("expected key=value, got '{pair}'"))?;
        if key.is_empty() {
            anyhow::bail!("empty key in '{pair}'");
        }
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

/// Load a YAML (or JSON, YAML being a superset) map of parameters. Scalar
/// values are rendered to strings; coercion against the schema happens later.
pub fn load_param_file(path: &Path) -> Result<HashMap<String, String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read param file {}", path.display()))?;
    let value: serde_yaml::Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("invalid param file {}", path.display()))?;
    let mapping = value
        .as_mapping()
        .with_context(|| format!("param file {} is not a map", path.display()))?;
    let mut map = HashMap::new();
    for (key, value) in mapping {
        let key = key
            .as_str()
            .with_context(|| format!("non-string key in {}", path.display()))?;
        let rendered = match value {
            serde_yaml::Value::String(s) => s.clone(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Null => String::new(),
            other => serde_yaml::to_string(other)
                .unwrap_or_default()
                .trim_end()
                .to_string(),
        };
        map.insert(key.to_string(), rendered);
    }
    Ok(map)
}

/// Build a JSON arguments object from raw string values guided by the tool's
/// input schema (`inputSchema` or `input_schema`). Unknown keys pass through
/// as strings; a missing required parameter is an error.
pub fn build_arguments(
    tool: &Value,
    provided: &HashMap<String, String>,
) -> Result<Map<String, Value>> {
    let schema = tool
        .get("inputSchema")
        .or_else(|| tool.get("input_schema"))
        .and_then(Value::as_object);

    let mut required: HashSet<&str> = HashSet::new();
    if let Some(req) = schema.and_then(|s| s.get("required")).and_then(Value::as_array) {
        required.extend(req.iter().filter_map(Value::as_str));
    }

    let mut remaining = provided.clone();
    let mut result = Map::new();

    if let Some(props) = schema
        .and_then(|s| s.get("properties"))
        .and_then(Value::as_object)
    {
        for (name, def) in props {
            let hint = def.get("type").and_then(Value::as_str).unwrap_or("string");
            if let Some(raw) = remaining.remove(name) {
                result.insert(name.clone(), coerce_value(&raw, hint));
            } else if required.contains(name.as_str()) {
                anyhow::bail!("missing required parameter: {name}");
            }
        }
    }

    for (key, value) in remaining {
        result.insert(key, Value::String(value));
    }
    Ok(result)
}

/// Coerce a raw string into a JSON value using a primitive type hint.
/// Uncoercible input stays a string so the server can report the mismatch.
pub fn coerce_value(raw: &str, hint: &str) -> Value {
    match hint {
        "integer" => raw
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        "number" => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        "boolean" => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Value::Bool(true),
            "false" | "0" | "no" | "n" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        "array" => Value::Array(
            raw.split(',')
                .map(|s| Value::String(s.trim().to_string()))
                .collect(),
        ),
        _ => Value::String(raw.to_string()),
    }
}

/// Find a tool by name, case-insensitively, in a descriptor list.
pub fn find_tool<'a>(tools: &'a [Value], name: &str) -> Option<&'a Value> {
    tools.iter().find(|tool| {
        tool.get("name")
            .and_then(Value::as_str)
            .is_some_and(|n| n.eq_ignore_ascii_case(name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn coerce_primitives() {
        assert_eq!(coerce_value("42", "integer"), json!(42));
        assert_eq!(coerce_value("x42", "integer"), json!("x42"));
        assert_eq!(coerce_value("yes", "boolean"), json!(true));
        assert_eq!(coerce_value("No", "boolean"), json!(false));
        assert_eq!(coerce_value("a,b, c", "array"), json!(["a", "b", "c"]));
        assert_eq!(coerce_value("1.5", "number"), json!(1.5));
    }

    #[test]
    fn build_arguments_respects_schema() {
        let tool = json!({
            "name": "get_topvisor_keywords",
            "inputSchema": {
                "type": "object",
                "required": ["project_id"],
                "properties": {
                    "project_id": { "type": "integer" },
                    "folder_id": { "type": "integer" }
                }
            }
        });
        let mut provided = HashMap::new();
        provided.insert("project_id".to_string(), "4878567".to_string());
        provided.insert("extra".to_string(), "kept".to_string());
        let args = build_arguments(&tool, &provided).unwrap();
        assert_eq!(args.get("project_id"), Some(&json!(4878567)));
        assert_eq!(args.get("extra"), Some(&json!("kept")));
        assert!(!args.contains_key("folder_id"));
    }

    #[test]
    fn build_arguments_missing_required() {
        let tool = json!({
            "inputSchema": {
                "type": "object",
                "required": ["target"],
                "properties": { "target": { "type": "string" } }
            }
        });
        let err = build_arguments(&tool, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("missing required parameter"));
    }

    #[test]
    fn kv_param_parsing() {
        let map =
            parse_kv_params(&["target=example.com".into(), "limit=50".into()]).unwrap();
        assert_eq!(map["target"], "example.com");
        assert_eq!(map["limit"], "50");
        assert!(parse_kv_params(&["broken".into()]).is_err());
    }

    #[test]
    fn param_file_yaml_and_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "target: example.com\nlimit: 25\ndry: true").unwrap();
        let map = load_param_file(file.path()).unwrap();
        assert_eq!(map["target"], "example.com");
        assert_eq!(map["limit"], "25");
        assert_eq!(map["dry"], "true");

        let mut json_file = tempfile::NamedTempFile::new().unwrap();
        write!(json_file, "{{\"target\": \"example.com\"}}").unwrap();
        assert_eq!(load_param_file(json_file.path()).unwrap()["target"], "example.com");
    }

    #[test]
    fn find_tool_is_case_insensitive() {
        let tools = vec![json!({ "name": "Get_Topvisor_Balance" })];
        assert!(find_tool(&tools, "get_topvisor_balance").is_some());
        assert!(find_tool(&tools, "absent").is_none());
    }

    #[test]
    fn resolve_target_prefers_flag() {
        let spec = resolve_target(Some("http://localhost:3000/mcp".into())).unwrap();
        assert!(!spec.is_local());
    }
}
