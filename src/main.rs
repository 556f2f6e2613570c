//! SSO Gate - JWT single-sign-on gate
//!
//! Verifies login tokens, keeps a session per client and proxies
//! authenticated traffic to the protected application.

use clap::Parser;
use sso_gate::config::Config;
use sso_gate::metrics::server::MetricsServer;
use sso_gate::server::Server;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// SSO Gate - JWT single-sign-on in front of any HTTP application
#[derive(Parser, Debug)]
#[command(name = "sso-gate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(args.log_level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting SSO Gate v{}", sso_gate::VERSION);

    let config = Config::load(&args.config)?;
    info!("Loaded configuration from {:?}", args.config);

    if args.check {
        info!("Configuration is valid");
        return Ok(());
    }

    let mut metrics_server = if config.metrics.enabled {
        let mut server = MetricsServer::new(&config.metrics.address);
        let addr = server.start().await?;
        info!("Metrics available at http://{}/metrics", addr);
        Some(server)
    } else {
        None
    };

    let server = Server::new(config).await?;
    let result = server.run().await;

    if let Some(metrics_server) = metrics_server.as_mut() {
        metrics_server.shutdown().await;
    }

    result?;
    Ok(())
}
