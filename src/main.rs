use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chronicle::config::{self, GatewayConfig};
use chronicle::{cli, server};

#[derive(Parser)]
#[command(name = "chronicle", version, about = "Policy-gated MCP gateway for capture history")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP gateway
    Serve {
        /// Config file (default: ~/.chronicle/gateway.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Check configuration, keys, database, and the validator model host
    Doctor {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Command::Serve { config: path } | Command::Doctor { config: path } => path
            .clone()
            .unwrap_or_else(config::default_config_path),
    };
    let config = GatewayConfig::load_from(&config_path)?;

    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { .. } => server::serve(config).await?,
        Command::Doctor { .. } => cli::doctor::doctor(&config, &config_path).await?,
    }

    Ok(())
}
