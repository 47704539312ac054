//! `mcp-seo serve`: run the SEO tool server over stdio or HTTP.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use crate::config::{ServeSettings, Transport};
use crate::server::{self, McpServer};
use crate::tools;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Transport to serve on (overrides MCP_SERVER_TRANSPORT)
    #[arg(long, value_enum)]
    pub transport: Option<Transport>,

    /// HTTP port (overrides MCP_SERVER_PORT)
    #[arg(short, long)]
    pub port: Option<u16>,
}

pub fn execute_serve(args: ServeArgs) -> Result<()> {
    let mut settings = ServeSettings::from_env()?;
    if let Some(transport) = args.transport {
        settings.transport = transport;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }

    let registry = tools::build_registry()?;
    let server = McpServer::new(registry);

    let rt = tokio::runtime::Runtime::new().context("failed to create Tokio runtime")?;
    rt.block_on(async {
        match settings.transport {
            Transport::Stdio => server::run_stdio(server).await,
            Transport::Http => server::http::serve(Arc::new(server), settings.port).await,
        }
    })
}
