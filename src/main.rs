use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use oracle::{cli, config::OracleConfig, http, server};

#[derive(Parser)]
#[command(name = "oracle", version, about = "Personal knowledge memory layer — hybrid retrieval over MCP and HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP tool server on stdio (the default)
    Mcp,
    /// Start the HTTP API server
    Server,
    /// Run one indexing pass to completion and exit
    Index,
    /// Start the HTTP server if it is not already running
    EnsureServer {
        /// Only report whether a server is running; never spawn one
        #[arg(long)]
        status: bool,
        /// Print each health probe
        #[arg(long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = OracleConfig::load()?;

    match cli.command.unwrap_or(Command::Mcp) {
        Command::Mcp => {
            server::serve_stdio(config).await?;
        }
        Command::Server => {
            http::serve(config).await?;
        }
        Command::Index => {
            cli::run_index(&config)?;
        }
        Command::EnsureServer { status, verbose } => {
            let healthy = cli::ensure_server::ensure_server(&config, status, verbose).await?;
            if !healthy {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
