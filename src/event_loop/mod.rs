//! Event loop pools.
//!
//! # Data Flow
//! ```text
//! AcceptorPool (N loops)                WorkerPool (M loops)
//!   acceptor-0: accept() ──┐              worker-0: conn-1, conn-4, ...
//!   acceptor-1: accept() ──┼─ round-robin ─▶ worker-1: conn-2, conn-5, ...
//!   ...                    ┘              worker-2: conn-3, ...
//! ```
//!
//! # Design Decisions
//! - Each loop is a current-thread Tokio runtime on its own OS thread, so a
//!   connection never migrates between threads after it is dispatched
//! - Loops drain in-flight work up to a shared deadline, then drop whatever is
//!   left, which closes the sockets
//! - Pool shutdown is idempotent

pub mod group;
pub mod pool;

pub use group::{EventLoopGroup, LoopHandle, LoopStopHook};
pub use pool::{AcceptorPool, WorkerPool};

use std::num::NonZeroUsize;

/// Which of the two pools a loop belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Acceptor,
    Worker,
}

impl PoolKind {
    /// Thread name prefix for loops of this kind.
    pub fn thread_prefix(&self) -> &'static str {
        match self {
            PoolKind::Acceptor => "acceptor",
            PoolKind::Worker => "worker",
        }
    }

    /// Pool size used when the configured count is 0.
    ///
    /// Acceptors get one loop per available core, workers two.
    pub fn default_threads(&self) -> usize {
        let cores = available_cores();
        match self {
            PoolKind::Acceptor => cores,
            PoolKind::Worker => cores.saturating_mul(2),
        }
    }
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.thread_prefix())
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .max(1)
}
