//! Error types for the TFTP engine.

use std::net::SocketAddr;
use thiserror::Error;

use crate::packet::ErrorCode;

/// Error type for TFTP operations
#[derive(Debug, Error)]
pub enum TftpError {
    /// Failed to bind a socket
    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Datagram could not be decoded
    #[error("invalid TFTP packet: {0}")]
    InvalidPacket(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer stopped responding
    #[error("transfer timeout for {filename}")]
    Timeout { filename: String },

    /// Peer answered with an ERROR packet
    #[error("remote error {code:?}: {message}")]
    Remote { code: ErrorCode, message: String },

    /// Peer sent a packet that is not valid at this point of the transfer
    #[error("unexpected packet: {0}")]
    Unexpected(String),

    /// Server shut down while a multiplexed transfer was in flight
    #[error("server stopped during transfer")]
    Stopped,
}

/// Result type for TFTP operations
pub type Result<T> = std::result::Result<T, TftpError>;
