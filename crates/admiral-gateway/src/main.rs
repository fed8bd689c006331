//! `admiral` command-line entry point

#![warn(clippy::all)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use admiral_auth::AuthServices;
use admiral_auth::oauth2::ReqwestTransport;
use admiral_gateway::{Gateway, ServerConfig};
use anyhow::Context;
use clap::{Parser, Subcommand};

/// Admiral control plane gateway
#[derive(Parser, Debug)]
#[command(name = "admiral", version, about = "OAuth2 auth and protocol gateway for the Admiral control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve RPC and HTTP traffic
    Serve {
        /// Configuration file (TOML, YAML or JSON)
        #[arg(short, long, env = "ADMIRAL_CONFIG", default_value = "admiral.toml")]
        config: PathBuf,

        /// Override the configured log level
        #[arg(long)]
        log_level: Option<String>,
    },

    /// Validate configuration and exit
    CheckConfig {
        /// Configuration file (TOML, YAML or JSON)
        #[arg(short, long, env = "ADMIRAL_CONFIG", default_value = "admiral.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Command::Serve { config, log_level } => serve(&config, log_level).await,
        Command::CheckConfig { config } => check_config(&config),
    }
}

async fn serve(path: &Path, log_level: Option<String>) -> anyhow::Result<()> {
    let mut config = ServerConfig::from_file(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    if let Some(level) = log_level {
        config.logging.level = level;
    }
    config.logging.init()?;

    let gateway = Gateway::builder(config).bind().await.context("gateway startup failed")?;
    gateway.serve().await.context("gateway stopped with an error")
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = ServerConfig::from_file(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    println!("configuration OK: {}", path.display());
    println!("  secure:    {}", config.security.secure);
    println!("  http:      {}", config.http_address);
    if !config.security.secure {
        println!("  rpc:       {}", config.grpc_address);
    }

    match config.active_auth() {
        Some(auth) => {
            // Builds every auth component without contacting the identity provider
            let transport = Arc::new(ReqwestTransport::new().context("failed to build HTTP client")?);
            let services = AuthServices::from_config(auth.clone(), transport)?;
            let client = services.metadata.client_descriptor();
            println!("  auth:      {:?}", services.metadata.kind());
            println!("  client_id: {}", client.client_id);
        }
        None => println!("  auth:      disabled"),
    }
    Ok(())
}
