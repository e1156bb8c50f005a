//! TFTP serving task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tftp_engine::Server;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::ResolvedSpec;
use crate::error::Error;
use crate::lifecycle::Shutdown;
use crate::repository::BinaryRepository;
use crate::tftp::TftpHandler;
use crate::Protocol;

/// Minimum time between starting the TFTP serve loop and stopping it.
///
/// Shutdown is never issued earlier, however soon the lifetime ends.
pub const TFTP_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

pub async fn bind(addr: SocketAddr) -> Result<UdpSocket, Error> {
    UdpSocket::bind(addr).await.map_err(|source| Error::Bind {
        protocol: Protocol::Tftp,
        addr,
        source,
    })
}

pub struct TftpService {
    engine: Server<TftpHandler>,
}

impl TftpService {
    pub fn new(spec: &ResolvedSpec, single_port: bool, repository: Arc<dyn BinaryRepository>) -> Self {
        let engine = Server::new(TftpHandler::new(repository))
            .timeout(spec.timeout)
            .single_port(single_port);
        Self { engine }
    }

    /// Serve on `socket` until `shutdown` ends.
    ///
    /// Stop sequence: wait out [`TFTP_SHUTDOWN_GRACE`] counted from the
    /// start of this call, stop the engine (which releases the socket), then
    /// wait for its serve loop to return.
    pub async fn run(self, socket: UdpSocket, shutdown: Shutdown) -> Result<(), Error> {
        let started = Instant::now();
        let addr = socket.local_addr().map_err(|e| Error::Tftp(e.into()))?;
        info!(address = %addr, "TFTP server starting");

        let stop = self.engine.shutdown_handle();
        let serving = self.engine.serve(socket);
        tokio::pin!(serving);

        let result = tokio::select! {
            result = &mut serving => result,
            _ = shutdown.wait() => {
                tokio::time::sleep_until(started + TFTP_SHUTDOWN_GRACE).await;
                debug!(address = %addr, "stopping TFTP engine");
                stop.shutdown();
                serving.await
            }
        };

        result?;
        info!(address = %addr, "TFTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;

    fn service() -> TftpService {
        let spec = ResolvedSpec {
            addr: "127.0.0.1:0".parse().unwrap(),
            timeout: Duration::from_secs(1),
            disabled: false,
        };
        TftpService::new(&spec, false, Arc::new(MemoryRepository::new()))
    }

    #[tokio::test]
    async fn test_immediate_shutdown_waits_for_grace() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let socket = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let begin = std::time::Instant::now();
        service().run(socket, shutdown).await.unwrap();
        assert!(begin.elapsed() >= TFTP_SHUTDOWN_GRACE);
    }

    #[tokio::test]
    async fn test_late_shutdown_is_not_delayed_further() {
        let shutdown = Shutdown::new();
        let socket = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let running = tokio::spawn(service().run(socket, shutdown.clone()));

        tokio::time::sleep(TFTP_SHUTDOWN_GRACE + Duration::from_millis(100)).await;
        let begin = std::time::Instant::now();
        shutdown.trigger();
        running.await.unwrap().unwrap();
        assert!(begin.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let err = bind(addr).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Bind {
                protocol: Protocol::Tftp,
                ..
            }
        ));
    }
}
