//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file
//! - Environment variables (`SPOUT__SECTION__KEY`, plus `SPOUT_HOST`/`SPOUT_PORT`)
//! - Command line (`--config <path>`)

use crate::resolve::ResolverKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spout_core::HubOptions;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Default config file locations, searched in order.
const CONFIG_PATHS: [&str; 3] = [
    "spout.toml",
    "/etc/spout/spout.toml",
    "~/.config/spout/spout.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Event stream configuration.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Hub configuration.
    #[serde(default)]
    pub hub: HubConfig,

    /// Control API configuration.
    #[serde(default)]
    pub api: ApiConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Event stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Reconnection delay stamped on every event, in milliseconds (0 = unset).
    #[serde(default)]
    pub retry_interval_ms: u64,

    /// Extra headers copied onto every stream response (e.g. CORS).
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// How topic and identity are derived from a request.
    #[serde(default)]
    pub resolver: ResolverKind,

    /// Encoded events buffered between a subscriber and its connection.
    #[serde(default = "default_body_buffer")]
    pub body_buffer: usize,
}

/// Hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Broadcast a heartbeat event to every subscriber.
    #[serde(default)]
    pub heartbeat: bool,

    /// Heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Outbound queue capacity per subscriber.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    /// Requests buffered ahead of the hub's control loop.
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

/// Control API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Path prefix for publish and admin endpoints.
    #[serde(default = "default_api_prefix")]
    pub prefix: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("SPOUT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("SPOUT_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_body_buffer() -> usize {
    16
}

fn default_heartbeat_interval() -> u64 {
    15_000 // 15 seconds
}

fn default_outbound_capacity() -> usize {
    16
}

fn default_command_capacity() -> usize {
    256
}

fn default_api_prefix() -> String {
    "/_hub".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            stream: StreamConfig::default(),
            hub: HubConfig::default(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 0,
            headers: HashMap::new(),
            resolver: ResolverKind::default(),
            body_buffer: default_body_buffer(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat: false,
            heartbeat_interval_ms: default_heartbeat_interval(),
            outbound_capacity: default_outbound_capacity(),
            command_capacity: default_command_capacity(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: default_api_prefix(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the default file locations and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// environment override has the wrong type.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        for path in &CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                builder = builder.add_source(config::File::new(
                    expanded.as_ref(),
                    config::FileFormat::Toml,
                ));
                break;
            }
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("SPOUT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration")?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))
    }

    /// Hub options derived from this configuration.
    ///
    /// Logger and disconnect hook are left for the caller to attach.
    #[must_use]
    pub fn hub_options(&self) -> HubOptions {
        HubOptions::default()
            .with_heartbeat(self.hub.heartbeat)
            .with_heartbeat_interval(Duration::from_millis(self.hub.heartbeat_interval_ms))
            .with_outbound_capacity(self.hub.outbound_capacity)
            .with_command_capacity(self.hub.command_capacity)
    }
}
