//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tcp_server_connections_accepted_total` (counter)
//! - `tcp_server_connections_active` (gauge)
//! - `tcp_server_accept_errors_total` (counter)
//! - `tcp_server_connection_failures_total` (counter): by `reason`
//! - `tcp_server_shutdowns_total` (counter): by `outcome`
//!
//! Recording is a no-op until a recorder is installed with [`init_metrics`].

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::lifecycle::ShutdownStatus;

pub const CONNECTIONS_ACCEPTED: &str = "tcp_server_connections_accepted_total";
pub const CONNECTIONS_ACTIVE: &str = "tcp_server_connections_active";
pub const ACCEPT_ERRORS: &str = "tcp_server_accept_errors_total";
pub const CONNECTION_FAILURES: &str = "tcp_server_connection_failures_total";
pub const SHUTDOWNS: &str = "tcp_server_shutdowns_total";

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!(CONNECTIONS_ACCEPTED, "Connections handed to a worker loop");
    describe_gauge!(CONNECTIONS_ACTIVE, "Connections currently open on worker loops");
    describe_counter!(ACCEPT_ERRORS, "Failed accept calls on the listening socket");
    describe_counter!(CONNECTION_FAILURES, "Connections closed by a setup error or panic");
    describe_counter!(SHUTDOWNS, "Completed server shutdowns");
}

pub fn record_accept_error() {
    counter!(ACCEPT_ERRORS).increment(1);
}

pub fn record_connection_failure(reason: &'static str) {
    counter!(CONNECTION_FAILURES, "reason" => reason).increment(1);
}

pub fn record_shutdown(status: ShutdownStatus) {
    let outcome = if status.is_graceful() { "graceful" } else { "forced" };
    counter!(SHUTDOWNS, "outcome" => outcome).increment(1);
}

/// Counts one open connection for as long as it is held.
#[derive(Debug)]
pub struct ActiveConnection {
    _private: (),
}

impl ActiveConnection {
    pub fn open() -> Self {
        counter!(CONNECTIONS_ACCEPTED).increment(1);
        gauge!(CONNECTIONS_ACTIVE).increment(1.0);
        Self { _private: () }
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
    }
}
