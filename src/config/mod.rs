//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → CLI overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → DaemonConfig (validated, immutable)
//!     → ListenerConfig moved into the multiplexer thread
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::DaemonConfig;
pub use schema::ListenerConfig;
pub use schema::LoggingConfig;
pub use schema::MetricsConfig;
pub use validation::{validate_config, ValidationError};
