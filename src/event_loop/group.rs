//! Fixed-size groups of single-threaded event loops.

use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio::runtime::{Builder, Handle};

use crate::error::ServerError;
use crate::event_loop::PoolKind;
use crate::lifecycle::shutdown::{deadline_after, Shutdown, ShutdownSignal, ShutdownStatus};
use crate::net::connection::{ConnectionGuard, ConnectionTracker};

/// Callback invoked on a loop's own thread after it has torn down.
pub type LoopStopHook = Arc<dyn Fn(PoolKind, usize) + Send + Sync>;

/// Cloneable access to a running loop for submitting work.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    kind: PoolKind,
    index: usize,
    runtime: Handle,
    tracker: ConnectionTracker,
    signal: ShutdownSignal,
}

impl LoopHandle {
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Connections currently tracked on this loop.
    pub fn in_flight(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Count a new connection against this loop's drain.
    pub(crate) fn track(&self) -> ConnectionGuard {
        self.tracker.track()
    }

    /// Fires when this loop starts shutting down.
    pub(crate) fn shutdown_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Run `task` on this loop. Tasks submitted after the loop has stopped are dropped.
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(self.runtime.spawn(task));
    }
}

/// One runtime on one thread.
struct EventLoop {
    handle: LoopHandle,
    shutdown: Shutdown,
    thread: Option<thread::JoinHandle<u64>>,
}

impl EventLoop {
    fn start(kind: PoolKind, index: usize, on_stop: Option<LoopStopHook>) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let shutdown = Shutdown::new();
        let handle = LoopHandle {
            kind,
            index,
            runtime: runtime.handle().clone(),
            tracker: ConnectionTracker::new(),
            signal: shutdown.subscribe(),
        };

        let tracker = handle.tracker.clone();
        let mut signal = shutdown.subscribe();
        let thread = thread::Builder::new()
            .name(format!("{}-{}", kind.thread_prefix(), index))
            .spawn(move || {
                let abandoned = runtime.block_on(async move {
                    let deadline = tokio::time::Instant::from_std(signal.recv().await);
                    match tokio::time::timeout_at(deadline, tracker.wait_idle()).await {
                        Ok(()) => 0,
                        Err(_) => tracker.active_count(),
                    }
                });
                // Drops every task still on the loop, closing its socket.
                runtime.shutdown_timeout(Duration::ZERO);
                tracing::trace!(pool = %kind, index, abandoned, "Event loop stopped");
                if let Some(hook) = on_stop {
                    hook(kind, index);
                }
                abandoned
            })?;

        Ok(Self {
            handle,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Wait for the loop thread to exit, returning the work it abandoned.
    fn join(&mut self) -> u64 {
        let Some(thread) = self.thread.take() else {
            return 0;
        };
        match thread.join() {
            Ok(abandoned) => abandoned,
            Err(_) => {
                tracing::error!(pool = %self.handle.kind, index = self.handle.index, "Event loop thread panicked");
                self.handle.in_flight()
            }
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown.trigger(Instant::now());
            self.join();
        }
    }
}

/// A fixed set of event loops of one [`PoolKind`].
pub struct EventLoopGroup {
    kind: PoolKind,
    loops: Vec<EventLoop>,
    terminated: bool,
}

impl EventLoopGroup {
    /// Start `threads` loops, or the kind's default when `threads` is 0.
    ///
    /// If any loop fails to start, the ones already running are stopped before
    /// the error is returned.
    pub fn new(
        kind: PoolKind,
        threads: usize,
        on_stop: Option<LoopStopHook>,
    ) -> Result<Self, ServerError> {
        let threads = if threads == 0 {
            kind.default_threads()
        } else {
            threads
        };

        let mut loops = Vec::with_capacity(threads);
        for index in 0..threads {
            let event_loop = EventLoop::start(kind, index, on_stop.clone())
                .map_err(|source| ServerError::PoolCreation { pool: kind, source })?;
            loops.push(event_loop);
        }

        tracing::debug!(pool = %kind, threads, "Event loop group started");
        Ok(Self {
            kind,
            loops,
            terminated: false,
        })
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Number of loops still owned by the group.
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn handles(&self) -> impl Iterator<Item = &LoopHandle> {
        self.loops.iter().map(|event_loop| &event_loop.handle)
    }

    /// In-flight work across all loops.
    pub fn in_flight(&self) -> u64 {
        self.handles().map(LoopHandle::in_flight).sum()
    }

    /// Tell every loop to stop taking work, without waiting.
    ///
    /// The deadline is fixed by the first call; later calls keep it.
    pub fn signal_shutdown(&self, deadline: Instant) {
        for event_loop in &self.loops {
            event_loop.shutdown.trigger(deadline);
        }
    }

    /// Drain every loop for up to `timeout`, then force the rest closed.
    ///
    /// Calling this on a terminated group returns [`ShutdownStatus::Graceful`].
    pub fn shutdown_gracefully(&mut self, timeout: Duration) -> ShutdownStatus {
        if self.terminated {
            return ShutdownStatus::Graceful;
        }
        self.terminated = true;

        self.signal_shutdown(deadline_after(timeout));
        let abandoned: u64 = self.loops.iter_mut().map(EventLoop::join).sum();
        self.loops.clear();

        if abandoned == 0 {
            tracing::debug!(pool = %self.kind, "Event loop group drained");
            ShutdownStatus::Graceful
        } else {
            tracing::warn!(pool = %self.kind, abandoned, "Drain timed out, forced connections closed");
            ShutdownStatus::Forced { abandoned }
        }
    }
}

impl Drop for EventLoopGroup {
    fn drop(&mut self) {
        if !self.terminated {
            self.shutdown_gracefully(Duration::ZERO);
        }
    }
}

impl std::fmt::Debug for EventLoopGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopGroup")
            .field("kind", &self.kind)
            .field("loops", &self.loops.len())
            .field("terminated", &self.terminated)
            .finish()
    }
}
