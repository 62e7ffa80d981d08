//! Listening socket and accept loop.
//!
//! # Responsibilities
//! - Bind the configured address with the configured backlog
//! - Accept incoming TCP connections on every acceptor loop
//! - Apply keep-alive / no-delay to each accepted socket
//! - Hand each connection to a worker loop
//! - Back off on accept errors instead of spinning

use std::net::SocketAddr;
use std::sync::Arc;

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tokio::net::{TcpListener, TcpStream};

use crate::error::ServerError;
use crate::event_loop::pool::WorkerDispatcher;
use crate::lifecycle::ShutdownSignal;
use crate::net::backoff::accept_backoff;
use crate::net::connection::serve_connection;
use crate::net::initializer::ConnectionInitializer;
use crate::net::options::TransportOptions;
use crate::observability::metrics;

/// The server's listening socket. Owned by the lifecycle controller only.
#[derive(Debug)]
pub struct BoundListener {
    socket: Socket,
    local_addr: SocketAddr,
}

impl BoundListener {
    /// Bind and listen on `options.socket_addr()` with `options.backlog_size()`.
    pub fn bind(options: &TransportOptions) -> Result<Self, ServerError> {
        let addr = options.socket_addr();
        let bind_error = move |source| ServerError::Bind { addr, source };

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(bind_error)?;
        socket.set_reuse_address(true).map_err(bind_error)?;
        socket.set_nonblocking(true).map_err(bind_error)?;
        socket.bind(&addr.into()).map_err(bind_error)?;

        let backlog = i32::try_from(options.backlog_size()).unwrap_or(i32::MAX);
        socket.listen(backlog).map_err(bind_error)?;

        let local_addr = socket
            .local_addr()
            .and_then(|addr| {
                addr.as_socket().ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "listener has no IP address")
                })
            })
            .map_err(bind_error)?;

        tracing::info!(address = %local_addr, backlog, "Listener bound");
        Ok(Self { socket, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Another handle to the same listening socket.
    pub(crate) fn try_clone_std(&self) -> std::io::Result<std::net::TcpListener> {
        Ok(self.socket.try_clone()?.into())
    }

    /// Stop the socket accepting and release it.
    ///
    /// Shutting the socket down affects every cloned handle, so acceptor loops
    /// stop receiving connections even before their own handles are dropped.
    pub fn close(self) {
        if let Err(e) = self.socket.shutdown(std::net::Shutdown::Both) {
            tracing::debug!(address = %self.local_addr, error = %e, "Listener shutdown returned an error");
        }
        tracing::info!(address = %self.local_addr, "Listener closed");
    }
}

/// Options applied to every accepted socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChildOptions {
    keep_alive: bool,
    no_delay: bool,
}

impl ChildOptions {
    fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        SockRef::from(stream).set_keepalive(self.keep_alive)?;
        stream.set_nodelay(self.no_delay)
    }
}

impl From<&TransportOptions> for ChildOptions {
    fn from(options: &TransportOptions) -> Self {
        Self {
            keep_alive: options.keep_alive(),
            no_delay: options.no_delay(),
        }
    }
}

/// Everything an accept loop needs to hand a connection to a worker.
pub(crate) struct AcceptContext {
    child: ChildOptions,
    workers: WorkerDispatcher,
    initializer: Arc<dyn ConnectionInitializer>,
}

impl AcceptContext {
    pub(crate) fn new(
        child: ChildOptions,
        workers: WorkerDispatcher,
        initializer: Arc<dyn ConnectionInitializer>,
    ) -> Self {
        Self {
            child,
            workers,
            initializer,
        }
    }

    /// Configure the socket and move it to the next worker loop.
    ///
    /// Failures only drop this connection.
    fn dispatch(&self, stream: TcpStream, peer_addr: SocketAddr) {
        if let Err(e) = self.child.apply(&stream) {
            tracing::warn!(peer_addr = %peer_addr, error = %e, "Failed to apply socket options, closing connection");
            metrics::record_connection_failure("socket_options");
            return;
        }

        // Detach from the acceptor's reactor; the worker registers it again.
        let stream = match stream.into_std() {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(peer_addr = %peer_addr, error = %e, "Failed to detach connection");
                metrics::record_connection_failure("register");
                return;
            }
        };

        let worker = self.workers.next();
        let guard = worker.track();
        worker.spawn(serve_connection(
            guard,
            stream,
            peer_addr,
            worker.index(),
            worker.shutdown_signal(),
            Arc::clone(&self.initializer),
        ));
    }
}

/// Accept until `stop` fires.
pub(crate) async fn accept_loop(
    listener: std::net::TcpListener,
    context: Arc<AcceptContext>,
    mut stop: ShutdownSignal,
    acceptor: usize,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(acceptor, error = %e, "Failed to register listener on acceptor loop");
            return;
        }
    };
    tracing::debug!(acceptor, "Accept loop started");

    let mut failures: u32 = 0;
    loop {
        let accepted = tokio::select! {
            biased;
            _ = stop.recv() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                failures = 0;
                context.dispatch(stream, peer_addr);
            }
            Err(e) => {
                if stop.is_triggered() {
                    break;
                }
                failures = failures.saturating_add(1);
                metrics::record_accept_error();
                let delay = accept_backoff(failures);
                tracing::warn!(acceptor, error = %e, retry_in = ?delay, "Accept failed");
                tokio::time::sleep(delay).await;
            }
        }
    }

    tracing::debug!(acceptor, "Accept loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn loopback(port: u16) -> TransportOptions {
        TransportOptions::builder(port)
            .host(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .backlog_size(16)
            .build()
            .unwrap()
    }

    #[test]
    fn bind_conflict_is_bind_error() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let err = BoundListener::bind(&loopback(port)).unwrap_err();
        match err {
            ServerError::Bind { addr, .. } => assert_eq!(addr.port(), port),
            other => panic!("expected bind error, got {other:?}"),
        }
    }

    #[test]
    fn closed_listener_frees_the_port() {
        let listener = BoundListener::bind(&loopback(28391)).unwrap();
        assert_eq!(listener.local_addr().port(), 28391);
        listener.close();
        assert!(std::net::TcpStream::connect("127.0.0.1:28391").is_err());
        let rebound = BoundListener::bind(&loopback(28391)).unwrap();
        rebound.close();
    }

    #[test]
    fn child_options_follow_transport_options() {
        let options = TransportOptions::builder(80)
            .keep_alive(false)
            .no_delay(true)
            .build()
            .unwrap();
        assert_eq!(
            ChildOptions::from(&options),
            ChildOptions {
                keep_alive: false,
                no_delay: true
            }
        );
    }
}
