//! `mcp-seo call`: one-shot tool invocation with CLI-supplied parameters.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use serde_json::Value;

use crate::client::{ToolClient, first_text};
use crate::cmd::format::{Role, StyleOptions, box_header, color};
use crate::cmd::shared::{build_arguments, find_tool, load_param_file, parse_kv_params,
    resolve_target};

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Tool name (case-insensitive)
    pub tool: String,

    /// Parameter key=value (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// YAML/JSON file with parameters (CLI --param overrides file entries)
    #[arg(long = "param-file", value_name = "FILE")]
    pub param_file: Option<PathBuf>,

    /// Target server (local command line or http(s) URL; default MCP_TARGET
    /// or this binary's own serve)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Machine-readable JSON output (full result envelope)
    #[arg(long)]
    pub json: bool,

    /// Print only the raw text content blocks
    #[arg(long)]
    pub raw: bool,
}

pub fn execute_call(args: CallArgs) -> Result<()> {
    let spec = resolve_target(args.target)?;

    let mut provided = match &args.param_file {
        Some(path) => load_param_file(path)?,
        None => Default::default(),
    };
    provided.extend(parse_kv_params(&args.params)?);

    let rt = tokio::runtime::Runtime::new().context("failed to create Tokio runtime")?;
    rt.block_on(async {
        let targets = vec![(spec.original().to_string(), spec.clone())];
        let client = ToolClient::connect(&targets).await?;

        let result = async {
            let Some(tool) = find_tool(client.tools(), &args.tool) else {
                bail!("tool '{}' not found on {spec}", args.tool);
            };
            let name = tool
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&args.tool)
                .to_string();
            let arguments = build_arguments(tool, &provided)?;
            client.call_tool(&name, arguments).await
        }
        .await;
        client.shutdown().await;
        let result = result?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }
        if args.raw {
            if let Some(blocks) = result.get("content").and_then(Value::as_array) {
                for block in blocks {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        println!("{text}");
                    }
                }
            }
            return Ok(());
        }

        let style = StyleOptions::detect();
        let is_error = result.get("isError").and_then(Value::as_bool).unwrap_or(false);
        let status = if is_error { "failed" } else { "ok" };
        println!(
            "{}",
            box_header(format!("{} ({status})", args.tool), Some(format!("target={spec}")), &style)
        );
        match first_text(&result) {
            Some(text) if is_error => println!("{}", color(Role::Error, text, &style)),
            Some(text) => println!("{text}"),
            None => println!("{}", serde_json::to_string_pretty(&result)?),
        }
        if is_error {
            bail!("tool '{}' reported an error", args.tool);
        }
        Ok(())
    })
}
