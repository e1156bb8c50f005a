//! Error taxonomy of the serving core.
//!
//! Per-request failures (a name with no binary) never become an [`Error`];
//! they are answered in-protocol. A serve loop returning `Ok(())` after its
//! shutdown sequence is the expected completion signal and is not an error
//! either. Everything else is fatal to the task that produced it and cancels
//! its sibling.

use std::net::SocketAddr;
use thiserror::Error;
use tftp_engine::TftpError;

use crate::config::ConfigError;
use crate::Protocol;

#[derive(Debug, Error)]
pub enum Error {
    /// `serve` was called without a pre-bound handle for this protocol.
    #[error("{protocol} listener not provided")]
    MissingListener { protocol: Protocol },

    #[error("failed to bind {protocol} listener on {addr}: {source}")]
    Bind {
        protocol: Protocol,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("TFTP serve loop failed: {0}")]
    Tftp(#[from] TftpError),

    #[error("HTTP serve loop failed: {0}")]
    Http(#[source] std::io::Error),

    #[error("{protocol} serving task panicked")]
    TaskPanicked { protocol: Protocol },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// More than one serving task failed.
    #[error("{}", join_messages(.0))]
    Multiple(Vec<Error>),
}

impl Error {
    /// Combine task errors: none is success, one is returned as-is.
    pub fn join(mut errors: Vec<Error>) -> Result<(), Error> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Multiple(errors)),
        }
    }
}

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
