//! Accepted connections and in-flight tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count in-flight connections per event loop so shutdown can drain them
//! - Run the pipeline initializer for one connection and contain its failures

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::lifecycle::ShutdownSignal;
use crate::net::initializer::ConnectionInitializer;
use crate::observability::metrics;

/// Source of connection IDs. Relaxed: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts in-flight connections on one event loop.
///
/// The count lives in a watch channel so the loop can await it reaching zero.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<watch::Sender<u64>>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            active: Arc::new(tx),
        }
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active.send_modify(|count| *count += 1);
        ConnectionGuard {
            active: Arc::clone(&self.active),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        *self.active.borrow()
    }

    /// Wait until all tracked connections have closed.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<watch::Sender<u64>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active
            .send_modify(|count| *count = count.saturating_sub(1));
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// An accepted connection, registered on the worker loop that owns it.
///
/// Handed to the [`ConnectionInitializer`] exactly once, before anything has
/// been read from the socket.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    stream: TcpStream,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    worker: usize,
    shutdown: ShutdownSignal,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Index of the worker event loop this connection is pinned to.
    pub fn worker_index(&self) -> usize {
        self.worker
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Fires when the owning worker starts draining.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }

    pub fn into_parts(self) -> (TcpStream, ShutdownSignal) {
        (self.stream, self.shutdown)
    }
}

/// Register an accepted socket on the current worker loop and run its pipeline.
///
/// Panics from the initializer or the pipeline it returns are caught here;
/// the connection is dropped and the worker keeps serving.
pub(crate) async fn serve_connection(
    guard: ConnectionGuard,
    stream: std::net::TcpStream,
    peer_addr: SocketAddr,
    worker: usize,
    shutdown: ShutdownSignal,
    initializer: Arc<dyn ConnectionInitializer>,
) {
    let id = guard.id();
    let stream = match TcpStream::from_std(stream) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(connection_id = %id, peer_addr = %peer_addr, error = %e, "Failed to register connection");
            metrics::record_connection_failure("register");
            return;
        }
    };
    let local_addr = match stream.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::warn!(connection_id = %id, peer_addr = %peer_addr, error = %e, "Connection lost before initialization");
            metrics::record_connection_failure("register");
            return;
        }
    };

    let _active = metrics::ActiveConnection::open();
    tracing::debug!(connection_id = %id, peer_addr = %peer_addr, worker, "Connection accepted");

    let connection = Connection {
        id,
        stream,
        peer_addr,
        local_addr,
        worker,
        shutdown,
    };

    let pipeline = match std::panic::catch_unwind(AssertUnwindSafe(|| {
        initializer.initialize(connection)
    })) {
        Ok(pipeline) => pipeline,
        Err(panic) => {
            tracing::warn!(connection_id = %id, panic = %panic_message(&*panic), "Connection initializer panicked");
            metrics::record_connection_failure("panic");
            return;
        }
    };

    if let Err(panic) = AssertUnwindSafe(pipeline).catch_unwind().await {
        tracing::warn!(connection_id = %id, panic = %panic_message(&*panic), "Connection pipeline panicked");
        metrics::record_connection_failure("panic");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
