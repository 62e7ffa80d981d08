//! The server lifecycle controller.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ServerError;
use crate::event_loop::{AcceptorPool, LoopStopHook, PoolKind, WorkerPool};
use crate::lifecycle::shutdown::{deadline_after, ShutdownStatus};
use crate::net::initializer::ConnectionInitializer;
use crate::net::listener::{AcceptContext, BoundListener, ChildOptions};
use crate::net::options::TransportOptions;
use crate::observability::metrics;

/// Lifecycle states, in the only order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    Uninitialized,
    Starting,
    Listening,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServerState::Uninitialized => "uninitialized",
            ServerState::Starting => "starting",
            ServerState::Listening => "listening",
            ServerState::ShuttingDown => "shutting down",
            ServerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

type StateHook = Arc<dyn Fn(ServerState) + Send + Sync>;

/// Owns the listening socket and both event loop pools of one server.
///
/// ```no_run
/// use std::time::Duration;
/// use tcp_bootstrap::{Connection, TcpServer, TransportOptions};
///
/// let options = TransportOptions::builder(18080).build()?;
/// let mut server = TcpServer::new();
/// server.start(&options, |conn: Connection| async move {
///     drop(conn);
/// })?;
/// // ... run until the host shuts down ...
/// let status = server.stop(Duration::from_secs(5));
/// assert!(status.is_graceful());
/// # Ok::<(), tcp_bootstrap::ServerError>(())
/// ```
///
/// `start` and `stop` block the calling thread; from async code run them via
/// `tokio::task::spawn_blocking`.
pub struct TcpServer {
    state: ServerState,
    listener: Option<BoundListener>,
    acceptors: Option<AcceptorPool>,
    workers: Option<WorkerPool>,
    on_state_change: Option<StateHook>,
    on_loop_stopped: Option<LoopStopHook>,
}

impl TcpServer {
    pub fn new() -> Self {
        Self {
            state: ServerState::Uninitialized,
            listener: None,
            acceptors: None,
            workers: None,
            on_state_change: None,
            on_loop_stopped: None,
        }
    }

    /// Observe every state transition, in order.
    #[must_use]
    pub fn on_state_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(ServerState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(hook));
        self
    }

    /// Observe each event loop thread as it finishes tearing down.
    #[must_use]
    pub fn on_loop_stopped<F>(mut self, hook: F) -> Self
    where
        F: Fn(PoolKind, usize) + Send + Sync + 'static,
    {
        self.on_loop_stopped = Some(Arc::new(hook));
        self
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Address the listening socket is bound to, while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(BoundListener::local_addr)
    }

    /// Size of the acceptor pool, while it exists.
    pub fn acceptor_threads(&self) -> Option<usize> {
        self.acceptors.as_ref().map(AcceptorPool::len)
    }

    /// Size of the worker pool, while it exists.
    pub fn worker_threads(&self) -> Option<usize> {
        self.workers.as_ref().map(WorkerPool::len)
    }

    /// Connections currently open on worker loops.
    pub fn in_flight(&self) -> u64 {
        self.workers.as_ref().map_or(0, WorkerPool::in_flight)
    }

    /// Create both pools, bind, and begin accepting.
    ///
    /// Returns once the socket is bound. On failure the server stays in
    /// [`ServerState::Starting`] with every pool already torn down.
    pub fn start<I>(&mut self, options: &TransportOptions, initializer: I) -> Result<SocketAddr, ServerError>
    where
        I: ConnectionInitializer,
    {
        if self.state != ServerState::Uninitialized {
            return Err(ServerError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }
        self.transition(ServerState::Starting);

        match self.bind_and_serve(options, Arc::new(initializer)) {
            Ok(addr) => {
                self.transition(ServerState::Listening);
                tracing::info!(
                    port = addr.port(),
                    acceptors = self.acceptor_threads().unwrap_or_default(),
                    workers = self.worker_threads().unwrap_or_default(),
                    "Server initialized"
                );
                Ok(addr)
            }
            Err(e) => {
                self.release_pools();
                tracing::error!(error = %e, "Server failed to start");
                Err(e)
            }
        }
    }

    fn bind_and_serve(
        &mut self,
        options: &TransportOptions,
        initializer: Arc<dyn ConnectionInitializer>,
    ) -> Result<SocketAddr, ServerError> {
        let acceptors = self.acceptors.insert(AcceptorPool::create(
            options.acceptor_threads(),
            self.on_loop_stopped.clone(),
        )?);
        let workers = self.workers.insert(WorkerPool::create(
            options.worker_threads(),
            self.on_loop_stopped.clone(),
        )?);

        let listener = BoundListener::bind(options)?;
        let addr = listener.local_addr();
        let context = AcceptContext::new(ChildOptions::from(options), workers.dispatcher(), initializer);
        acceptors
            .serve(&listener, Arc::new(context))
            .map_err(|source| ServerError::Bind { addr, source })?;

        self.listener = Some(listener);
        Ok(addr)
    }

    fn release_pools(&mut self) {
        if let Some(mut acceptors) = self.acceptors.take() {
            acceptors.shutdown(Duration::ZERO);
        }
        if let Some(mut workers) = self.workers.take() {
            workers.shutdown(Duration::ZERO);
        }
    }

    /// Stop accepting, drain workers for up to `timeout`, then force the rest.
    ///
    /// A no-op returning [`ShutdownStatus::Graceful`] when the server never
    /// started or has already stopped.
    pub fn stop(&mut self, timeout: Duration) -> ShutdownStatus {
        match self.state {
            ServerState::Uninitialized | ServerState::Stopped => {
                tracing::debug!(state = %self.state, "Stop ignored");
                return ShutdownStatus::Graceful;
            }
            ServerState::Starting | ServerState::Listening | ServerState::ShuttingDown => {}
        }

        let deadline = deadline_after(timeout);
        self.transition(ServerState::ShuttingDown);

        // Close the socket before touching the pools so no new connection
        // can arrive while workers drain.
        if let Some(acceptors) = &self.acceptors {
            acceptors.stop_accepting(deadline);
        }
        if let Some(listener) = self.listener.take() {
            listener.close();
        }

        let accept_status = self
            .acceptors
            .take()
            .map_or(ShutdownStatus::Graceful, |mut acceptors| {
                acceptors.shutdown(remaining(deadline))
            });
        let worker_status = self
            .workers
            .take()
            .map_or(ShutdownStatus::Graceful, |mut workers| {
                workers.shutdown(remaining(deadline))
            });
        let status = accept_status.merge(worker_status);

        self.transition(ServerState::Stopped);
        metrics::record_shutdown(status);
        match status {
            ShutdownStatus::Graceful => tracing::info!("Server stopped"),
            ShutdownStatus::Forced { abandoned } => {
                tracing::warn!(abandoned, "Server stopped after forcing connections closed")
            }
        }
        status
    }

    fn transition(&mut self, next: ServerState) {
        tracing::debug!(from = %self.state, to = %next, "Server state transition");
        self.state = next;
        if let Some(hook) = &self.on_state_change {
            hook(next);
        }
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

impl Default for TcpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        if matches!(self.state, ServerState::Starting | ServerState::Listening) {
            if self.listener.is_some() {
                tracing::warn!("Server dropped while listening, stopping without grace period");
            }
            self.stop(Duration::ZERO);
        }
    }
}

impl std::fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServer")
            .field("state", &self.state)
            .field("local_addr", &self.local_addr())
            .field("acceptors", &self.acceptor_threads())
            .field("workers", &self.worker_threads())
            .finish_non_exhaustive()
    }
}
