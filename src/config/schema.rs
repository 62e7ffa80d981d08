//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::net::TransportOptions;

/// Root configuration for the server process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listening socket and pool sizing.
    pub transport: TransportConfig,

    /// Shutdown grace period.
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Logging and metrics settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl ServerConfig {
    /// Configuration for `port` with every other setting at its default.
    pub fn new(port: i64) -> Self {
        Self {
            transport: TransportConfig::new(port),
            shutdown: ShutdownConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }

    /// Validate the transport section into immutable options.
    pub fn transport_options(&self) -> Result<TransportOptions, ServerError> {
        TransportOptions::from_config(&self.transport)
    }
}

/// Raw transport settings as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Address to bind (default: all interfaces).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// TCP port to bind. Required.
    pub port: i64,

    /// OS accept backlog.
    #[serde(default = "default_backlog")]
    pub backlog_size: i64,

    /// Acceptor pool size (0 = one per CPU core).
    #[serde(default)]
    pub acceptor_threads: i64,

    /// Worker pool size (0 = two per CPU core).
    #[serde(default)]
    pub worker_threads: i64,

    /// SO_KEEPALIVE on accepted connections.
    #[serde(default = "default_true")]
    pub keep_alive: bool,

    /// TCP_NODELAY on accepted connections.
    #[serde(default = "default_true")]
    pub no_delay: bool,
}

impl TransportConfig {
    pub fn new(port: i64) -> Self {
        Self {
            host: default_host(),
            port,
            backlog_size: default_backlog(),
            acceptor_threads: 0,
            worker_threads: 0,
            keep_alive: true,
            no_delay: true,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_backlog() -> i64 {
    crate::net::options::DEFAULT_BACKLOG as i64
}

fn default_true() -> bool {
    true
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time in-flight connections get to finish before being closed.
    pub grace_period_secs: u64,
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive, overridden by `RUST_LOG`.
    pub log_filter: String,

    /// Emit logs as JSON lines.
    pub log_json: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            log_json: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9000".to_string(),
        }
    }
}
