//! `mcp-seo tools`: enumerate the tools of a target server.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use crate::client::ToolClient;
use crate::cmd::format::{StyleOptions, box_header, table, truncate_ellipsis};
use crate::cmd::shared::resolve_target;

#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Target server (local command line or http(s) URL; default MCP_TARGET
    /// or this binary's own serve)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

pub fn execute_tools(args: ToolsArgs) -> Result<()> {
    let spec = resolve_target(args.target)?;
    let rt = tokio::runtime::Runtime::new().context("failed to create Tokio runtime")?;
    rt.block_on(async {
        let targets = vec![(spec.original().to_string(), spec.clone())];
        let client = ToolClient::connect(&targets).await?;
        let tools = client.tools().to_vec();
        client.shutdown().await;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&tools)?);
            return Ok(());
        }

        let style = StyleOptions::detect();
        println!(
            "{}",
            box_header(
                format!("Tools ({})", tools.len()),
                Some(format!("target={spec}")),
                &style
            )
        );
        let rows: Vec<Vec<String>> = tools
            .iter()
            .enumerate()
            .map(|(i, tool)| {
                vec![
                    (i + 1).to_string(),
                    tool.get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("?")
                        .to_string(),
                    param_summary(tool),
                    truncate_ellipsis(
                        tool.get("description").and_then(Value::as_str).unwrap_or(""),
                        60,
                    ),
                ]
            })
            .collect();
        println!("{}", table(&["#", "NAME", "PARAMS", "DESCRIPTION"], &rows, &style));
        Ok(())
    })
}

/// "project_id*, folder_id" style summary; `*` marks required parameters.
fn param_summary(tool: &Value) -> String {
    let schema = tool
        .get("inputSchema")
        .or_else(|| tool.get("input_schema"));
    let required: Vec<&str> = schema
        .and_then(|s| s.get("required"))
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let Some(props) = schema
        .and_then(|s| s.get("properties"))
        .and_then(Value::as_object)
    else {
        return "-".to_string();
    };
    if props.is_empty() {
        return "-".to_string();
    }
    props
        .keys()
        .map(|name| {
            if required.contains(&name.as_str()) {
                format!("{name}*")
            } else {
                name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn param_summary_marks_required() {
        let tool = json!({
            "inputSchema": {
                "type": "object",
                "required": ["project_id"],
                "properties": {
                    "project_id": { "type": "integer" },
                    "folder_id": { "type": "integer" }
                }
            }
        });
        let summary = param_summary(&tool);
        assert!(summary.contains("project_id*"));
        assert!(summary.contains("folder_id"));
    }

    #[test]
    fn param_summary_empty_schema() {
        assert_eq!(param_summary(&json!({ "inputSchema": { "type": "object" } })), "-");
        assert_eq!(
            param_summary(&json!({ "inputSchema": { "type": "object", "properties": {} } })),
            "-"
        );
    }
}
