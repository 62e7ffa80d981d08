//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! listener / event loops / lifecycle produce:
//!     → tracing events (bind, accept, drain, state transitions)
//!     → metrics (accepted, active, accept errors, failures, shutdowns)
//!
//! Consumers:
//!     → logging.rs installs the subscriber (binary only)
//!     → metrics.rs installs the Prometheus exporter (binary only)
//! ```
//!
//! # Design Decisions
//! - The library never installs a subscriber or recorder itself
//! - Every connection log line carries its connection id

pub mod logging;
pub mod metrics;
