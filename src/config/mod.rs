//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)            CLI flags
//!     → loader.rs (parse)           │
//!     → validation.rs               │
//!     → AppConfig ◀─────────────────┘ overrides
//!     → AppConfig.server: ServerConfig (fields may be unset)
//!     → resolve.rs (fill defaults, never overwrite)
//!     → ResolvedConfig (immutable for the life of the server)
//! ```
//!
//! # Design Decisions
//! - Unset is `None`, so an explicit value equal to a zero value survives
//! - All file fields are optional
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod resolve;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use resolve::{resolve, ResolvedConfig, ResolvedSpec, DEFAULT_HTTP_ADDR, DEFAULT_TFTP_ADDR, DEFAULT_TIMEOUT};
pub use schema::{AppConfig, BinariesConfig, ObservabilityConfig, ProtocolSpec, ServerConfig};
pub use validation::{validate_config, ValidationError};
