//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! options.rs (validated TransportOptions)
//!     → listener.rs (bind + listen(backlog), accept loop per acceptor)
//!     → keep-alive / no-delay applied to the accepted socket
//!     → connection.rs (registered on one worker loop, tracked for drain)
//!     → initializer.rs (application pipeline installed exactly once)
//! ```
//!
//! # Design Decisions
//! - One listening socket shared by all acceptor loops
//! - A connection's failure (setup error or panic) closes only that connection
//! - Accept errors back off exponentially instead of spinning

pub mod backoff;
pub mod connection;
pub mod initializer;
pub mod listener;
pub mod options;

pub use connection::{Connection, ConnectionId};
pub use initializer::ConnectionInitializer;
pub use listener::BoundListener;
pub use options::{TransportOptions, TransportOptionsBuilder};
