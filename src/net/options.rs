//! Validated transport options.

use std::net::{IpAddr, SocketAddr};

use crate::config::schema::TransportConfig;
use crate::config::validation::{check_backlog, check_port, check_threads};
use crate::error::ServerError;

/// Default OS accept backlog.
pub const DEFAULT_BACKLOG: u32 = 1024;

/// Immutable, validated listening-socket and pool settings.
///
/// Construct through [`TransportOptions::builder`] or
/// [`TransportOptions::from_config`]; both reject an out-of-range port, a zero
/// backlog and thread counts outside the allowed range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    host: IpAddr,
    port: u16,
    backlog_size: u32,
    acceptor_threads: u32,
    worker_threads: u32,
    keep_alive: bool,
    no_delay: bool,
}

impl TransportOptions {
    /// Start building options for `port`.
    pub fn builder(port: u16) -> TransportOptionsBuilder {
        TransportOptionsBuilder {
            config: TransportConfig::new(i64::from(port)),
        }
    }

    /// Validate raw config values, reporting every rejected field.
    pub fn from_config(config: &TransportConfig) -> Result<Self, ServerError> {
        let port = check_port(config.port);
        let backlog_size = check_backlog(config.backlog_size);
        let acceptor_threads = check_threads("acceptor_threads", config.acceptor_threads);
        let worker_threads = check_threads("worker_threads", config.worker_threads);

        match (port, backlog_size, acceptor_threads, worker_threads) {
            (Ok(port), Ok(backlog_size), Ok(acceptor_threads), Ok(worker_threads)) => Ok(Self {
                host: config.host,
                port,
                backlog_size,
                acceptor_threads,
                worker_threads,
                keep_alive: config.keep_alive,
                no_delay: config.no_delay,
            }),
            (port, backlog_size, acceptor_threads, worker_threads) => {
                let errors = [
                    port.err(),
                    backlog_size.err(),
                    acceptor_threads.err(),
                    worker_threads.err(),
                ]
                .into_iter()
                .flatten()
                .collect();
                Err(ServerError::InvalidConfiguration(errors))
            }
        }
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address the listening socket binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn backlog_size(&self) -> u32 {
        self.backlog_size
    }

    /// Requested acceptor pool size; 0 selects the pool default.
    pub fn acceptor_threads(&self) -> u32 {
        self.acceptor_threads
    }

    /// Requested worker pool size; 0 selects the pool default.
    pub fn worker_threads(&self) -> u32 {
        self.worker_threads
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn no_delay(&self) -> bool {
        self.no_delay
    }
}

/// Builder for [`TransportOptions`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct TransportOptionsBuilder {
    config: TransportConfig,
}

impl TransportOptionsBuilder {
    #[must_use]
    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    #[must_use]
    pub fn backlog_size(mut self, backlog: u32) -> Self {
        self.config.backlog_size = i64::from(backlog);
        self
    }

    #[must_use]
    pub fn acceptor_threads(mut self, threads: u32) -> Self {
        self.config.acceptor_threads = i64::from(threads);
        self
    }

    #[must_use]
    pub fn worker_threads(mut self, threads: u32) -> Self {
        self.config.worker_threads = i64::from(threads);
        self
    }

    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.config.keep_alive = enabled;
        self
    }

    #[must_use]
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.config.no_delay = enabled;
        self
    }

    pub fn build(self) -> Result<TransportOptions, ServerError> {
        TransportOptions::from_config(&self.config)
    }
}
