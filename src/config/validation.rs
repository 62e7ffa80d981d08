//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, backlog, thread counts, grace period)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Checks are pure functions that also narrow the raw integer to its final type

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{ServerConfig, TransportConfig};

/// Largest pool an operator may request.
pub const MAX_POOL_THREADS: u32 = 1024;

/// Longest accepted shutdown grace period.
pub const MAX_GRACE_PERIOD_SECS: u64 = 3600;

/// A single rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("port {0} is outside 1..=65535")]
    PortOutOfRange(i64),

    #[error("backlog_size {0} must be between 1 and {max}", max = i32::MAX)]
    BacklogOutOfRange(i64),

    #[error("{field} {value} must be between 0 and {max}", max = MAX_POOL_THREADS)]
    ThreadCountOutOfRange { field: &'static str, value: i64 },

    #[error("grace_period_secs {0} exceeds {max}", max = MAX_GRACE_PERIOD_SECS)]
    GracePeriodTooLong(u64),

    #[error("metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
}

pub fn check_port(raw: i64) -> Result<u16, ValidationError> {
    match u16::try_from(raw) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ValidationError::PortOutOfRange(raw)),
    }
}

pub fn check_backlog(raw: i64) -> Result<u32, ValidationError> {
    match i32::try_from(raw) {
        Ok(backlog) if backlog > 0 => Ok(backlog as u32),
        _ => Err(ValidationError::BacklogOutOfRange(raw)),
    }
}

pub fn check_threads(field: &'static str, raw: i64) -> Result<u32, ValidationError> {
    match u32::try_from(raw) {
        Ok(threads) if threads <= MAX_POOL_THREADS => Ok(threads),
        _ => Err(ValidationError::ThreadCountOutOfRange { field, value: raw }),
    }
}

/// Collect every transport error.
pub fn transport_errors(config: &TransportConfig) -> Vec<ValidationError> {
    [
        check_port(config.port).err(),
        check_backlog(config.backlog_size).err(),
        check_threads("acceptor_threads", config.acceptor_threads).err(),
        check_threads("worker_threads", config.worker_threads).err(),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Validate a complete server configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = transport_errors(&config.transport);

    if config.shutdown.grace_period_secs > MAX_GRACE_PERIOD_SECS {
        errors.push(ValidationError::GracePeriodTooLong(
            config.shutdown.grace_period_secs,
        ));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
