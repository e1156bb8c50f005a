//! HTTP adapter.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum, middleware, graceful shutdown)
//!     → handler.rs (path → name resolution → repository lookup)
//!     → 200 with the binary, or 404
//! ```

pub mod handler;
pub mod server;

pub use handler::AppState;
pub use server::{bind, HttpServer};
