//! `mcp-seo chat`: the interactive front-end.
//!
//! Server set resolution: repeatable `--server` flags win, then a
//! `server_config.json` if present, and as a last resort the current binary
//! is spawned with `serve`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::chat;
use crate::client::target::{TargetSpec, parse_target};
use crate::client::{ServerConfig, ToolClient};
use crate::cmd::shared::self_serve_target;
use crate::config::ChatSettings;

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Tool server target (repeatable; local command line or http(s) URL)
    #[arg(short = 's', long = "server", value_name = "TARGET")]
    pub servers: Vec<String>,

    /// Server configuration file (mcpServers map)
    #[arg(long, default_value = "server_config.json")]
    pub config: PathBuf,

    /// Model to use (overrides SEO_CHAT_MODEL)
    #[arg(long)]
    pub model: Option<String>,
}

pub fn execute_chat(args: ChatArgs) -> Result<()> {
    let mut settings = ChatSettings::from_env();
    if let Some(model) = args.model {
        settings.model = model;
    }

    let targets = resolve_targets(&args.servers, &args.config)?;

    let rt = tokio::runtime::Runtime::new().context("failed to create Tokio runtime")?;
    rt.block_on(async {
        let client = ToolClient::connect(&targets).await?;
        chat::run(client, settings).await
    })
}

fn resolve_targets(
    servers: &[String],
    config: &std::path::Path,
) -> Result<Vec<(String, TargetSpec)>> {
    if !servers.is_empty() {
        return servers
            .iter()
            .map(|raw| Ok((raw.clone(), parse_target(raw)?)))
            .collect();
    }
    if config.exists() {
        return ServerConfig::load(config)?.targets();
    }
    Ok(vec![("seo".to_string(), self_serve_target()?)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn explicit_servers_win_over_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "mcpServers": {{ "other": {{ "command": "other-server" }} }} }}"#
        )
        .unwrap();
        let targets = resolve_targets(
            &["http://localhost:3000/mcp".to_string()],
            file.path(),
        )
        .unwrap();
        assert_eq!(targets.len(), 1);
        assert!(!targets[0].1.is_local());
    }

    #[test]
    fn config_file_used_when_no_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "mcpServers": {{ "seo": {{ "command": "mcp-seo", "args": ["serve"] }} }} }}"#
        )
        .unwrap();
        let targets = resolve_targets(&[], file.path()).unwrap();
        assert_eq!(targets[0].0, "seo");
        assert!(targets[0].1.is_local());
    }

    #[test]
    fn falls_back_to_self_serve() {
        let targets = resolve_targets(&[], std::path::Path::new("/nonexistent.json")).unwrap();
        assert_eq!(targets.len(), 1);
        assert!(targets[0].1.is_local());
        assert!(targets[0].1.original().ends_with(" serve"));
    }
}
