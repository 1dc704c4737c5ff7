//! # Spout Server
//!
//! Server-sent events fan-out server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! spout
//!
//! # Run with custom config
//! spout --config /path/to/spout.toml
//!
//! # Run with environment variables
//! SPOUT_PORT=8080 SPOUT_HOST=0.0.0.0 SPOUT__HUB__HEARTBEAT=true spout
//! ```

mod config;
mod handlers;
mod metrics;
mod resolve;

use anyhow::{bail, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spout=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match config_path()? {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };

    tracing::info!("Starting Spout server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}

/// Path given with `--config`, if any.
fn config_path() -> Result<Option<String>> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(path) => return Ok(Some(path)),
                None => bail!("--config requires a path"),
            },
            other => bail!("Unknown argument: {other}"),
        }
    }
    Ok(None)
}
