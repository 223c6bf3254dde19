//! Mnemo MCP server binary

use anyhow::Context;
use clap::{Parser, Subcommand};
use mnemo_core::{mcp::RpcHandler, Dispatcher, InMemoryBackend, McpHttpServer, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mnemo-mcp")]
#[command(about = "Namespaced memory tools over MCP Streamable HTTP", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (TOML)
    #[arg(short, long, env = "MNEMO_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the MCP endpoint (default)
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        addr: Option<SocketAddr>,
    },

    /// Print the capability document and exit
    Capabilities,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG wins when set; otherwise our crates at the requested level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "mnemo_core={level},mnemo_mcp={level},tower_http=warn,ractor=warn",
            level = level.as_str().to_lowercase()
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Mnemo MCP v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = ServerConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command.unwrap_or(Commands::Serve { addr: None }) {
        Commands::Serve { addr } => {
            if let Some(addr) = addr {
                config.bind_addr = addr;
            }
            let server = McpHttpServer::from_config(config)?;
            server
                .serve(async {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Received shutdown signal, stopping MCP server gracefully...");
                    }
                })
                .await?;
            info!("MCP server shut down complete");
        }
        Commands::Capabilities => {
            let backend = Arc::new(InMemoryBackend::with_search_limit(config.search_limit_max));
            let document = Dispatcher::new(backend).capabilities();
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }

    Ok(())
}
