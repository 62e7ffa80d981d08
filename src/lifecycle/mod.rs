//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (server.rs):
//!     Uninitialized → Starting: create acceptor + worker pools
//!                   → bind socket (backlog)  ── fail → release pools, stay Starting
//!                   → Listening: accept loops running
//!
//! Shutdown (server.rs, shutdown.rs):
//!     → ShuttingDown: close socket → stop acceptors → drain workers (deadline)
//!                   → force remaining connections closed
//!                   → Stopped (terminal)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → host calls TcpServer::stop
//! ```
//!
//! # Design Decisions
//! - Ordered startup: pools first, socket last (traffic only when ready)
//! - Ordered shutdown: stop accept, then drain
//! - Shutdown has a deadline: forced close after it, reported as a status

pub mod server;
pub mod shutdown;
pub mod signals;

pub use server::{ServerState, TcpServer};
pub use shutdown::{Shutdown, ShutdownSignal, ShutdownStatus};
