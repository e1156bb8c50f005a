//! Boot binary lookup.
//!
//! Both adapters resolve a requested name with [`BootName::parse`] and then
//! ask a [`BinaryRepository`] for the bytes under the resulting key, so a
//! client gets the same binary over TFTP and HTTP.

pub mod memory;
pub mod name;

use bytes::Bytes;

pub use memory::MemoryRepository;
pub use name::{BootName, MacAddr};

/// Read-only catalog of boot binaries.
///
/// Shared by every concurrent request of both protocols without locking,
/// so implementations must be safe to call from many tasks at once.
pub trait BinaryRepository: Send + Sync {
    /// Bytes stored under `name`, or `None` when there is no such binary.
    fn lookup(&self, name: &str) -> Option<Bytes>;
}
