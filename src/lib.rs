//! Dual-protocol iPXE binary server.
//!
//! Serves network-boot firmware images over TFTP and HTTP from one
//! [`BinaryRepository`], under a single cancellable lifetime.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────── lifecycle::startup ────────────────────────┐
//!                 │                                                                    │
//!  UDP datagram ──┼─▶ tftp-engine ──▶ tftp::handler ──┐                                │
//!                 │                                   ├──▶ repository (lookup by name) │
//!  HTTP request ──┼─▶ axum router ──▶ http::handler ──┘                                │
//!                 │                                                                    │
//!                 │  TaskGroup: first failure cancels the sibling, errors are joined   │
//!                 └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ipxe_serve::{MemoryRepository, Server, ServerConfig, Shutdown};
//!
//! # async fn run() -> Result<(), ipxe_serve::Error> {
//! let repository = MemoryRepository::new().with("ipxe.efi", vec![0u8; 1024]);
//! let server = Server::new(ServerConfig::default(), Arc::new(repository));
//! let lifetime = Shutdown::new();
//! server.listen_and_serve(&lifetime).await
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod repository;
pub mod tftp;

use std::fmt;

pub use config::{resolve, ServerConfig};
pub use error::Error;
pub use lifecycle::{Server, Shutdown};
pub use repository::{BinaryRepository, MemoryRepository};

/// The two protocols a [`Server`] speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tftp,
    Http,
}

impl Protocol {
    /// Lowercase name, used as a metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tftp => "tftp",
            Protocol::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tftp => f.write_str("TFTP"),
            Protocol::Http => f.write_str("HTTP"),
        }
    }
}
