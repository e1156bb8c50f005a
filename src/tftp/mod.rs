//! TFTP adapter.
//!
//! # Data Flow
//! ```text
//! UDP datagram
//!     → tftp-engine (framing, options, retransmission)
//!     → handler.rs (name resolution, repository lookup)
//!     → ReadSource streamed back by the engine, or an ERROR packet
//! ```
//!
//! # Design Decisions
//! - Read-only: write requests get an access violation
//! - Single-port mode is passed straight to the engine
//! - Shutdown is delayed until a fixed grace period after start

pub mod handler;
pub mod server;

pub use handler::TftpHandler;
pub use server::{bind, TftpService, TFTP_SHUTDOWN_GRACE};
