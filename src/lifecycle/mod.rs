//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Resolve config → Obtain listeners → Spawn TFTP + HTTP tasks (group.rs)
//!
//! Shutdown (shutdown.rs):
//!     Lifetime ends (caller, signal or task failure)
//!         → TFTP: grace delay → engine shutdown → serve loop returns
//!         → HTTP: stop accepting → drain within timeout
//!     → Join task errors
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT/SIGHUP → end the lifetime
//! ```
//!
//! # Design Decisions
//! - One lifetime for the whole server; the task group runs under a child
//! - The orchestrator returns only after every task has stopped

pub mod group;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use group::TaskGroup;
pub use shutdown::Shutdown;
pub use signals::spawn_signal_listener;
pub use startup::Server;
