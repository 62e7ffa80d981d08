//! Error taxonomy for the server lifecycle.
//!
//! Configuration and bind failures are returned synchronously from
//! [`TcpServer::start`](crate::lifecycle::TcpServer::start). A drain that
//! overruns its deadline is not an error; it is reported through
//! [`ShutdownStatus`](crate::lifecycle::ShutdownStatus). Failures on a single
//! connection never surface here.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::validation::ValidationError;
use crate::event_loop::PoolKind;
use crate::lifecycle::ServerState;

/// Errors surfaced to the caller of the lifecycle controller.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Transport options were rejected before any resource was allocated.
    #[error("invalid configuration: {}", join_errors(.0))]
    InvalidConfiguration(Vec<ValidationError>),

    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// An event loop thread or runtime could not be created.
    #[error("failed to create {pool} pool: {source}")]
    PoolCreation {
        pool: PoolKind,
        #[source]
        source: std::io::Error,
    },

    /// The operation is not valid in the controller's current state.
    #[error("cannot {operation} a server that is {state}")]
    InvalidState {
        operation: &'static str,
        state: ServerState,
    },
}

impl ServerError {
    /// Returns the validation failures when this is a configuration error.
    pub fn validation_errors(&self) -> Option<&[ValidationError]> {
        match self {
            ServerError::InvalidConfiguration(errors) => Some(errors),
            _ => None,
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
