//! TFTP server: receive loop, request dispatch and shutdown.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, TftpError};
use crate::packet::{ErrorCode, Mode, Packet, TransferOptions, MAX_BLOCK_SIZE};
use crate::transfer::{self, Opening};

/// Default retransmission timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of retransmissions before a transfer is abandoned
pub const DEFAULT_RETRIES: u32 = 5;

/// Largest datagram the engine can receive: a full DATA packet
pub(crate) const RECV_BUFFER: usize = MAX_BLOCK_SIZE as usize + 4;

/// Datagrams queued per transfer in single-port mode
const INBOX_CAPACITY: usize = 64;

/// A read or write request as seen by the [`Handler`].
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Address of the requesting client
    pub peer: SocketAddr,
    /// Filename exactly as sent by the client
    pub filename: String,
    pub mode: Mode,
    /// Options the client asked for
    pub options: TransferOptions,
}

/// Data source for a read request.
pub struct ReadSource {
    pub(crate) reader: Box<dyn AsyncRead + Send + Unpin>,
    pub(crate) size: Option<u64>,
}

impl ReadSource {
    /// Stream from any reader. `size` is reported to clients asking for `tsize`.
    pub fn new<R>(reader: R, size: Option<u64>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            size,
        }
    }

    pub fn from_bytes(data: Bytes) -> Self {
        let size = data.len() as u64;
        Self::new(Cursor::new(data), Some(size))
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }
}

/// Data sink for a write request.
pub struct WriteSink {
    pub(crate) writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl WriteSink {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Box::new(writer),
        }
    }
}

/// Refusal of a request, sent to the client as an ERROR packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct Rejection {
    pub code: ErrorCode,
    pub message: String,
}

impl Rejection {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FileNotFound, message)
    }

    pub fn access_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AccessViolation, message)
    }
}

/// Per-request callbacks.
///
/// Called once per RRQ or WRQ, from the task that runs the transfer.
/// Implementations are shared by every concurrent transfer.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Open the data source for a read request.
    async fn read(&self, request: &TransferRequest) -> std::result::Result<ReadSource, Rejection>;

    /// Open the data sink for a write request.
    async fn write(&self, request: &TransferRequest) -> std::result::Result<WriteSink, Rejection>;
}

/// Timing knobs shared by every transfer of a server.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
    pub timeout: Duration,
    pub retries: u32,
}

/// Stops a running (or not yet started) [`Server`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    stop: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Request shutdown.
    ///
    /// Safe to call at any time, including before `serve` was first polled;
    /// `serve` then returns as soon as it starts.
    pub fn shutdown(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.stop.borrow()
    }
}

/// TFTP server
pub struct Server<H> {
    handler: Arc<H>,
    settings: Settings,
    single_port: bool,
    stop: Arc<watch::Sender<bool>>,
}

impl<H: Handler> Server<H> {
    /// Create a new server with default timeout and retries.
    pub fn new(handler: H) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            handler: Arc::new(handler),
            settings: Settings {
                timeout: DEFAULT_TIMEOUT,
                retries: DEFAULT_RETRIES,
            },
            single_port: false,
            stop: Arc::new(stop),
        }
    }

    /// Retransmission timeout used when the client does not negotiate one.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.settings.retries = retries;
        self
    }

    /// Serve every transfer on the listening socket.
    pub fn single_port(mut self, enabled: bool) -> Self {
        self.single_port = enabled;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// Run the receive loop on `socket` until shutdown.
    ///
    /// On shutdown the socket is released, transfers multiplexed on it are
    /// abandoned and transfers on their own sockets run to completion before
    /// this returns `Ok(())`. A receive error on the listening socket ends
    /// the loop with that error.
    pub async fn serve(&self, socket: UdpSocket) -> Result<()> {
        let mut stop = self.stop.subscribe();
        if *stop.borrow_and_update() {
            debug!("shutdown requested before serving");
            return Ok(());
        }

        let socket = Arc::new(socket);
        let local_addr = socket.local_addr()?;
        info!(
            addr = %local_addr,
            single_port = self.single_port,
            timeout = ?self.settings.timeout,
            "TFTP engine serving"
        );

        let mut transfers: JoinSet<SocketAddr> = JoinSet::new();
        let mut routes: HashMap<SocketAddr, mpsc::Sender<Bytes>> = HashMap::new();
        let mut buf = vec![0u8; RECV_BUFFER];

        let outcome = loop {
            tokio::select! {
                biased;
                _ = stopped(&mut stop) => break Ok(()),
                Some(joined) = transfers.join_next(), if !transfers.is_empty() => {
                    match joined {
                        // A newer transfer from the same peer may own the
                        // route by now; only drop it once its inbox is gone.
                        Ok(peer) => {
                            if routes.get(&peer).is_some_and(|inbox| inbox.is_closed()) {
                                routes.remove(&peer);
                            }
                        }
                        Err(e) => warn!(error = %e, "transfer task failed"),
                    }
                }
                received = socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => {
                            self.dispatch(&buf[..len], peer, &socket, &mut routes, &mut transfers);
                        }
                        Err(e) => break Err(TftpError::Io(e)),
                    }
                }
            }
        };

        // Closing the inboxes ends single-port transfers; dropping our
        // reference releases the socket once those have exited.
        drop(routes);
        drop(socket);
        while let Some(joined) = transfers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "transfer task failed");
            }
        }

        match &outcome {
            Ok(()) => info!(addr = %local_addr, "TFTP engine stopped"),
            Err(e) => warn!(addr = %local_addr, error = %e, "TFTP engine receive loop failed"),
        }
        outcome
    }

    fn dispatch(
        &self,
        datagram: &[u8],
        peer: SocketAddr,
        socket: &Arc<UdpSocket>,
        routes: &mut HashMap<SocketAddr, mpsc::Sender<Bytes>>,
        transfers: &mut JoinSet<SocketAddr>,
    ) {
        if let Some(inbox) = routes.get(&peer) {
            match inbox.try_send(Bytes::copy_from_slice(datagram)) {
                Ok(()) => return,
                Err(TrySendError::Full(_)) => {
                    trace!(peer = %peer, "transfer inbox full, dropping datagram");
                    return;
                }
                Err(TrySendError::Closed(_)) => {
                    routes.remove(&peer);
                }
            }
        }

        let (request, is_write) = match Packet::parse(datagram) {
            Ok(Packet::Rrq(request)) => (request, false),
            Ok(Packet::Wrq(request)) => (request, true),
            Ok(other) => {
                debug!(peer = %peer, packet = ?other, "ignoring packet outside of a transfer");
                return;
            }
            Err(e) => {
                debug!(peer = %peer, error = %e, "ignoring malformed datagram");
                return;
            }
        };

        debug!(
            peer = %peer,
            filename = %request.filename,
            write = is_write,
            "new transfer"
        );

        let opening = if self.single_port {
            let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
            routes.insert(peer, tx);
            Opening::Shared {
                socket: Arc::clone(socket),
                inbox: rx,
            }
        } else {
            Opening::Dedicated {
                local_ip: socket
                    .local_addr()
                    .map(|addr| addr.ip())
                    .unwrap_or(std::net::Ipv4Addr::UNSPECIFIED.into()),
            }
        };

        let request = TransferRequest {
            peer,
            filename: request.filename,
            mode: request.mode,
            options: request.options,
        };
        let handler = Arc::clone(&self.handler);
        let settings = self.settings;
        transfers.spawn(
            transfer::run(handler, opening, request, is_write, settings).with_current_subscriber(),
        );
    }
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

impl<H> std::fmt::Debug for Server<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("settings", &self.settings)
            .field("single_port", &self.single_port)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refuse;

    #[async_trait]
    impl Handler for Refuse {
        async fn read(&self, _: &TransferRequest) -> std::result::Result<ReadSource, Rejection> {
            Err(Rejection::not_found("nothing here"))
        }

        async fn write(&self, _: &TransferRequest) -> std::result::Result<WriteSink, Rejection> {
            Err(Rejection::access_violation("read-only"))
        }
    }

    #[test]
    fn test_builder_settings() {
        let server = Server::new(Refuse)
            .timeout(Duration::from_millis(250))
            .retries(2)
            .single_port(true);
        assert_eq!(server.settings.timeout, Duration::from_millis(250));
        assert_eq!(server.settings.retries, 2);
        assert!(server.single_port);
    }

    #[test]
    fn test_rejection_constructors() {
        assert_eq!(Rejection::not_found("x").code, ErrorCode::FileNotFound);
        assert_eq!(Rejection::access_violation("x").code, ErrorCode::AccessViolation);
    }

    #[test]
    fn test_read_source_from_bytes_reports_size() {
        let source = ReadSource::from_bytes(Bytes::from_static(b"12345"));
        assert_eq!(source.size(), Some(5));
    }

    #[tokio::test]
    async fn test_shutdown_before_serve_returns_immediately() {
        let server = Server::new(Refuse);
        let handle = server.shutdown_handle();
        handle.shutdown();
        assert!(handle.is_shutdown());

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), server.serve(socket)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_shutdown_while_serving() {
        let server = Arc::new(Server::new(Refuse));
        let handle = server.shutdown_handle();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let serving = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(socket).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(1), serving).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
