//! Trellis daemon.
//!
//! Serves the workflow engine over REST:
//! - project-scoped work instance listing and creation
//! - atomic step updates and approvals
//! - deliverable export
//! - admin routes for project registration and template authoring

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod server;

use config::DaemonConfig;
use error::{DaemonError, DaemonResult};
use server::Server;

/// Trellis daemon CLI.
#[derive(Parser)]
#[command(name = "trellisd")]
#[command(about = "Trellis daemon - templated workflow engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "TRELLIS_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "TRELLIS_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level
    #[arg(long, env = "TRELLIS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "TRELLIS_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut config =
        DaemonConfig::load(cli.config.as_deref()).map_err(|e| DaemonError::Config(e.to_string()))?;

    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("invalid listen address: {e}")))?;
    }

    Server::new(config).await?.run().await
}
