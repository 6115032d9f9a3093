//! CLIA tool server
//!
//! Serves the built-in file and shell tools over MCP on stdin/stdout.
//! Logs go to stderr; stdout carries only JSON-RPC responses.

use clap::Parser;
use clia::config::load_config;
use clia::mcp::McpServer;
use clia::tools::{default_registry, DEFAULT_SHELL_TIMEOUT};
use clia::{Result, VERSION};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "clia-tools",
    author = "CLIA Contributors",
    version = VERSION,
    about = "MCP stdio server exposing file and shell tools to the CLIA agent",
    long_about = None
)]
struct Args {
    /// Directory relative tool paths are resolved against (defaults to the current directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Upper bound for a single shell command, in seconds
    #[arg(long, env = "CLIA_SHELL_TIMEOUT_SECS")]
    shell_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "clia=warn".into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();

    let configured_timeout = match load_config() {
        Ok(config) => config.tool_server.shell_timeout,
        Err(e) => {
            warn!("Using default tool settings: {}", e);
            DEFAULT_SHELL_TIMEOUT
        }
    };
    let shell_timeout = args
        .shell_timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(configured_timeout);

    let root = match args.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };

    // Ctrl-C in the client's terminal reaches this process too
    tokio::spawn(async {
        while tokio::signal::ctrl_c().await.is_ok() {
            debug!("Ignoring interrupt");
        }
    });

    let registry = default_registry(&root, shell_timeout);
    info!(
        "Serving {} tools from {} (shell timeout {:?})",
        registry.count(),
        root.display(),
        shell_timeout
    );

    McpServer::new(registry).serve_stdio().await
}
