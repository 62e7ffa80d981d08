//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (range checks, all errors collected)
//!     → ServerConfig
//!     → TransportOptions (validated, immutable) handed to TcpServer::start
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a new server instance is needed to change it
//! - Everything except the port has a default
//! - Numeric fields are signed in the schema so negative or oversized values
//!   become validation errors instead of parse errors

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::ObservabilityConfig;
pub use schema::ServerConfig;
pub use schema::ShutdownConfig;
pub use schema::TransportConfig;
pub use validation::ValidationError;
