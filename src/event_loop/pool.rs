//! The acceptor and worker pools.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ServerError;
use crate::event_loop::group::{EventLoopGroup, LoopHandle, LoopStopHook};
use crate::event_loop::PoolKind;
use crate::lifecycle::ShutdownStatus;
use crate::net::listener::{accept_loop, AcceptContext, BoundListener};

/// Loops dedicated to accepting connections on the listening socket.
#[derive(Debug)]
pub struct AcceptorPool {
    group: EventLoopGroup,
}

impl AcceptorPool {
    /// Start `threads` acceptor loops (0 = one per CPU core).
    pub fn create(threads: u32, on_stop: Option<LoopStopHook>) -> Result<Self, ServerError> {
        Ok(Self {
            group: EventLoopGroup::new(PoolKind::Acceptor, threads as usize, on_stop)?,
        })
    }

    pub fn len(&self) -> usize {
        self.group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }

    /// Run an accept loop for `listener` on every acceptor.
    ///
    /// Each loop registers its own handle to the same socket, so the kernel
    /// spreads pending connections across them.
    pub(crate) fn serve(
        &self,
        listener: &BoundListener,
        context: Arc<AcceptContext>,
    ) -> std::io::Result<()> {
        for handle in self.group.handles() {
            let socket = listener.try_clone_std()?;
            let context = Arc::clone(&context);
            let signal = handle.shutdown_signal();
            let acceptor = handle.index();
            handle.spawn(accept_loop(socket, context, signal, acceptor));
        }
        Ok(())
    }

    /// Stop every accept loop without waiting for the threads.
    pub fn stop_accepting(&self, deadline: Instant) {
        self.group.signal_shutdown(deadline);
    }

    pub fn shutdown(&mut self, timeout: Duration) -> ShutdownStatus {
        self.group.shutdown_gracefully(timeout)
    }
}

/// Loops that own accepted connections for their whole lifetime.
#[derive(Debug)]
pub struct WorkerPool {
    group: EventLoopGroup,
    next: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Start `threads` worker loops (0 = two per CPU core).
    pub fn create(threads: u32, on_stop: Option<LoopStopHook>) -> Result<Self, ServerError> {
        Ok(Self {
            group: EventLoopGroup::new(PoolKind::Worker, threads as usize, on_stop)?,
            next: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn len(&self) -> usize {
        self.group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }

    /// Connections currently open across all workers.
    pub fn in_flight(&self) -> u64 {
        self.group.in_flight()
    }

    pub(crate) fn dispatcher(&self) -> WorkerDispatcher {
        WorkerDispatcher {
            loops: self.group.handles().cloned().collect(),
            next: Arc::clone(&self.next),
        }
    }

    pub fn shutdown(&mut self, timeout: Duration) -> ShutdownStatus {
        self.group.shutdown_gracefully(timeout)
    }
}

/// Round-robin selection of the worker that will own the next connection.
#[derive(Debug, Clone)]
pub(crate) struct WorkerDispatcher {
    loops: Arc<[LoopHandle]>,
    next: Arc<AtomicUsize>,
}

impl WorkerDispatcher {
    pub(crate) fn next(&self) -> &LoopHandle {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.loops.len();
        &self.loops[index]
    }
}
