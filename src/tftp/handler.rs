//! TFTP engine callbacks backed by a [`BinaryRepository`].

use async_trait::async_trait;
use std::sync::Arc;
use tftp_engine::{Handler, ReadSource, Rejection, TransferRequest, WriteSink};
use tracing::{debug, info};

use crate::observability::metrics::{self, Outcome};
use crate::repository::{BinaryRepository, BootName};
use crate::Protocol;

/// Read-only handler: reads are served from the repository, writes refused.
pub struct TftpHandler {
    repository: Arc<dyn BinaryRepository>,
}

impl TftpHandler {
    pub fn new(repository: Arc<dyn BinaryRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Handler for TftpHandler {
    async fn read(&self, request: &TransferRequest) -> Result<ReadSource, Rejection> {
        let name = BootName::parse(&request.filename);
        let found = name
            .as_ref()
            .and_then(|name| self.repository.lookup(&name.file));

        match (name, found) {
            (Some(name), Some(data)) => {
                info!(
                    peer = %request.peer,
                    file = %name.file,
                    mac = name.mac.map(tracing::field::display),
                    size = data.len(),
                    "serving binary over TFTP"
                );
                metrics::record_lookup(Protocol::Tftp, Outcome::Found);
                metrics::record_bytes(Protocol::Tftp, data.len() as u64);
                Ok(ReadSource::from_bytes(data))
            }
            _ => {
                debug!(peer = %request.peer, filename = %request.filename, "TFTP binary not found");
                metrics::record_lookup(Protocol::Tftp, Outcome::NotFound);
                Err(Rejection::not_found(format!("{} not found", request.filename)))
            }
        }
    }

    async fn write(&self, request: &TransferRequest) -> Result<WriteSink, Rejection> {
        debug!(peer = %request.peer, filename = %request.filename, "refusing TFTP write");
        metrics::record_lookup(Protocol::Tftp, Outcome::Rejected);
        Err(Rejection::access_violation("server is read-only"))
    }
}
