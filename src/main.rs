use anyhow::Result;
use clap::{Parser, Subcommand};

mod api;
mod chat;
mod client;
mod cmd;
mod config;
mod registry;
mod server;
mod tools;

use cmd::{CallArgs, ChatArgs, ServeArgs, ToolsArgs};

/// mcp-seo - Topvisor and Ahrefs SEO data as MCP tools.
///
/// Command layout:
///   mcp-seo serve [--transport stdio|http] [-p PORT]
///   mcp-seo chat  [-s "<target>" ...] [--config server_config.json]
///   mcp-seo tools [-t "<target>"] [--json]
///   mcp-seo call  <tool-name> [--param k=v ...] [-t "<target>"] [--json] [--raw]
///
/// Global flags / env:
///   -v / -vv        Increase verbosity
///   -q / --quiet    Errors only
///   MCP_TARGET      Fallback target for `tools` / `call`
///
/// Target kinds:
///   Local command (spawned over stdio): e.g. "mcp-seo serve"
///   Remote URL (http/https):            e.g. "http://localhost:3000/mcp"
///
/// Examples:
///   mcp-seo serve
///   mcp-seo chat
///   mcp-seo tools --json
///   mcp-seo call get_topvisor_balance
///   mcp-seo call get_ahrefs_refdomains --param target=example.com --param limit=50
#[derive(Parser, Debug)]
#[command(
    name = "mcp-seo",
    version,
    author,
    about = "Topvisor and Ahrefs SEO data as MCP tools, with a tool-calling chat front-end",
    propagate_version = true,
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Silence all non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the SEO tool server (stdio or http)
    Serve(ServeArgs),

    /// Interactive chat with slash commands and model tool-calling
    Chat(ChatArgs),

    /// List tools exposed by a target server
    Tools(ToolsArgs),

    /// Invoke one tool directly
    Call(CallArgs),
}

fn main() -> Result<()> {
    config::load_dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Serve(args) => cmd::execute_serve(args),
        Commands::Chat(args) => cmd::execute_chat(args),
        Commands::Tools(args) => cmd::execute_tools(args),
        Commands::Call(args) => cmd::execute_call(args),
    }
}

/// Logs go to stderr so the stdio protocol stream stays clean.
fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mcp_seo={default_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
