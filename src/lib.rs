//! Event-loop TCP server bootstrap.
//!
//! Hosts an application-supplied connection pipeline on two pools of
//! single-threaded event loops: acceptors that take connections off the
//! listening socket, and workers that own each connection for its lifetime.
//!
//! ```text
//!                  ┌──────────────────────────── TcpServer ─────────────────────────────┐
//!                  │                                                                    │
//!  TCP clients ────┼─▶ BoundListener ──▶ AcceptorPool ──round-robin──▶ WorkerPool       │
//!                  │   (backlog)         acceptor-0..N                  worker-0..M     │
//!                  │                     keep-alive / no-delay          │               │
//!                  │                                                    ▼               │
//!                  │                                     ConnectionInitializer          │
//!                  │                                     (application pipeline)         │
//!                  │                                                                    │
//!                  │  Uninitialized → Starting → Listening → ShuttingDown → Stopped     │
//!                  └────────────────────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod event_loop;
pub mod net;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ServerConfig;
pub use error::ServerError;
pub use lifecycle::{ServerState, ShutdownStatus, TcpServer};
pub use net::{Connection, ConnectionInitializer, TransportOptions};
