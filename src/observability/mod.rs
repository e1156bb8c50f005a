//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Adapters and serving tasks produce:
//!     → logging.rs (structured log events, routed to the configured sink)
//!     → metrics.rs (request and byte counters)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The server never touches the global subscriber; it logs through the
//!   sink in its configuration, which discards by default
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
