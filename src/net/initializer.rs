//! Per-connection pipeline installation.

use std::future::Future;

use futures_util::future::BoxFuture;

use crate::net::connection::Connection;

/// Installs protocol handling on a freshly accepted connection.
///
/// Called exactly once per connection, on the worker event loop the connection
/// is pinned to, before any data has been read. The returned future is the
/// connection's pipeline; it runs on that same loop until it completes, the
/// connection is closed when it is dropped.
///
/// Any `Fn(Connection) -> impl Future<Output = ()>` closure is an initializer:
///
/// ```no_run
/// use tcp_bootstrap::net::Connection;
/// use tokio::io::AsyncWriteExt;
///
/// let greeter = |mut conn: Connection| async move {
///     let _ = conn.stream_mut().write_all(b"hello\n").await;
/// };
/// # let _ = greeter;
/// ```
pub trait ConnectionInitializer: Send + Sync + 'static {
    fn initialize(&self, connection: Connection) -> BoxFuture<'static, ()>;
}

impl<F, Fut> ConnectionInitializer for F
where
    F: Fn(Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn initialize(&self, connection: Connection) -> BoxFuture<'static, ()> {
        Box::pin(self(connection))
    }
}
