//! Per-transfer state machines.

use bytes::Bytes;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

use crate::error::{Result, TftpError};
use crate::packet::{ErrorCode, Packet, TransferOptions, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};
use crate::server::{Handler, Settings, TransferRequest, RECV_BUFFER};

/// How a transfer gets its socket.
pub(crate) enum Opening {
    /// Bind an ephemeral port on this address.
    Dedicated { local_ip: IpAddr },
    /// Share the listening socket; datagrams arrive through `inbox`.
    Shared {
        socket: Arc<UdpSocket>,
        inbox: mpsc::Receiver<Bytes>,
    },
}

/// Transport between the engine and one peer.
enum Link {
    Dedicated { socket: UdpSocket, buf: Vec<u8> },
    Shared {
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        inbox: mpsc::Receiver<Bytes>,
    },
}

impl Link {
    async fn open(opening: Opening, peer: SocketAddr) -> Result<Self> {
        match opening {
            Opening::Dedicated { local_ip } => {
                let addr = SocketAddr::new(local_ip, 0);
                let socket = UdpSocket::bind(addr)
                    .await
                    .map_err(|source| TftpError::BindFailed { addr, source })?;
                socket.connect(peer).await?;
                Ok(Link::Dedicated {
                    socket,
                    buf: vec![0u8; RECV_BUFFER],
                })
            }
            Opening::Shared { socket, inbox } => Ok(Link::Shared {
                socket,
                peer,
                inbox,
            }),
        }
    }

    async fn send(&self, packet: &Packet) -> Result<()> {
        let datagram = packet.encode();
        match self {
            Link::Dedicated { socket, .. } => socket.send(&datagram).await?,
            Link::Shared { socket, peer, .. } => socket.send_to(&datagram, *peer).await?,
        };
        Ok(())
    }

    /// Next decodable packet from the peer, `None` once `deadline` passes.
    async fn recv_until(&mut self, deadline: Instant) -> Result<Option<Packet>> {
        loop {
            let parsed = match self {
                Link::Dedicated { socket, buf } => match timeout_at(deadline, socket.recv(buf)).await {
                    Err(_) => return Ok(None),
                    Ok(received) => Packet::parse(&buf[..received?]),
                },
                Link::Shared { inbox, .. } => match timeout_at(deadline, inbox.recv()).await {
                    Err(_) => return Ok(None),
                    Ok(None) => return Err(TftpError::Stopped),
                    Ok(Some(datagram)) => Packet::parse(&datagram),
                },
            };
            match parsed {
                Ok(packet) => return Ok(Some(packet)),
                Err(e) => trace!(error = %e, "dropping malformed datagram"),
            }
        }
    }
}

/// Lock-step send/await loop with retransmission.
struct Exchange<'a> {
    link: Link,
    timeout: Duration,
    retries: u32,
    filename: &'a str,
}

impl Exchange<'_> {
    /// Send `packet` until the peer acknowledges `block`.
    async fn await_ack(&mut self, packet: &Packet, block: u16) -> Result<()> {
        for attempt in 0..=self.retries {
            self.link.send(packet).await?;
            let deadline = Instant::now() + self.timeout;
            while let Some(reply) = self.link.recv_until(deadline).await? {
                match reply {
                    Packet::Ack(acked) if acked == block => return Ok(()),
                    Packet::Error { code, message } => return Err(TftpError::Remote { code, message }),
                    // Stale ACKs are not answered, which avoids the
                    // duplicate-ACK retransmission storm.
                    other => trace!(packet = ?other, expected = block, "ignoring packet"),
                }
            }
            trace!(attempt, block, "ack timeout, retransmitting");
        }
        Err(self.timed_out())
    }

    /// Send `packet` until the peer delivers DATA `block`.
    async fn await_data(&mut self, packet: &Packet, block: u16) -> Result<Bytes> {
        let previous = block.wrapping_sub(1);
        for attempt in 0..=self.retries {
            self.link.send(packet).await?;
            let deadline = Instant::now() + self.timeout;
            while let Some(reply) = self.link.recv_until(deadline).await? {
                match reply {
                    Packet::Data { block: got, data } if got == block => return Ok(data),
                    Packet::Data { block: got, .. } if got == previous => {
                        // Our ACK was lost; repeat it.
                        self.link.send(packet).await?;
                    }
                    Packet::Error { code, message } => return Err(TftpError::Remote { code, message }),
                    other => trace!(packet = ?other, expected = block, "ignoring packet"),
                }
            }
            trace!(attempt, block, "data timeout, retransmitting");
        }
        Err(self.timed_out())
    }

    async fn abort(&self, code: ErrorCode, message: &str) {
        if let Err(e) = self.link.send(&Packet::error(code, message)).await {
            debug!(error = %e, "failed to send error packet");
        }
    }

    fn timed_out(&self) -> TftpError {
        TftpError::Timeout {
            filename: self.filename.to_string(),
        }
    }
}

/// Run one transfer to completion. Returns the peer so the server can
/// release its route.
pub(crate) async fn run<H: Handler>(
    handler: Arc<H>,
    opening: Opening,
    request: TransferRequest,
    is_write: bool,
    settings: Settings,
) -> SocketAddr {
    let peer = request.peer;
    let result = async {
        let link = Link::open(opening, peer).await?;
        if is_write {
            write(handler.as_ref(), link, &request, settings).await
        } else {
            read(handler.as_ref(), link, &request, settings).await
        }
    }
    .await;

    if let Err(e) = result {
        debug!(peer = %peer, filename = %request.filename, error = %e, "transfer ended with error");
    }
    peer
}

/// Options the server acknowledges in its OACK.
fn negotiate(requested: &TransferOptions, size: Option<u64>) -> TransferOptions {
    TransferOptions {
        blksize: requested.blksize.map(|size| size.min(MAX_BLOCK_SIZE)),
        tsize: requested.tsize.and(size),
        timeout: requested.timeout,
    }
}

fn exchange_for<'a>(
    link: Link,
    negotiated: &TransferOptions,
    request: &'a TransferRequest,
    settings: Settings,
) -> (Exchange<'a>, usize) {
    let block_size = negotiated.blksize.unwrap_or(DEFAULT_BLOCK_SIZE) as usize;
    let timeout = negotiated
        .timeout
        .map(|secs| Duration::from_secs(secs.into()))
        .unwrap_or(settings.timeout);
    let exchange = Exchange {
        link,
        timeout,
        retries: settings.retries,
        filename: &request.filename,
    };
    (exchange, block_size)
}

async fn read<H: Handler>(
    handler: &H,
    link: Link,
    request: &TransferRequest,
    settings: Settings,
) -> Result<()> {
    let mut source = match handler.read(request).await {
        Ok(source) => source,
        Err(rejection) => {
            debug!(peer = %request.peer, filename = %request.filename, reason = %rejection, "read request rejected");
            link.send(&Packet::error(rejection.code, rejection.message)).await?;
            return Ok(());
        }
    };

    let negotiated = negotiate(&request.options, source.size);
    let (mut exchange, block_size) = exchange_for(link, &negotiated, request, settings);
    if !negotiated.is_empty() {
        exchange.await_ack(&Packet::Oack(negotiated), 0).await?;
    }

    let mut buf = vec![0u8; block_size];
    let mut block: u16 = 1;
    let mut sent: u64 = 0;
    loop {
        let filled = match fill(&mut source.reader, &mut buf).await {
            Ok(filled) => filled,
            Err(e) => {
                exchange.abort(ErrorCode::NotDefined, "read failed").await;
                return Err(e.into());
            }
        };
        let data = Packet::Data {
            block,
            data: Bytes::copy_from_slice(&buf[..filled]),
        };
        exchange.await_ack(&data, block).await?;
        sent += filled as u64;
        if filled < block_size {
            break;
        }
        block = block.wrapping_add(1);
    }

    debug!(peer = %request.peer, filename = %request.filename, bytes = sent, "read transfer complete");
    Ok(())
}

async fn write<H: Handler>(
    handler: &H,
    link: Link,
    request: &TransferRequest,
    settings: Settings,
) -> Result<()> {
    let mut sink = match handler.write(request).await {
        Ok(sink) => sink,
        Err(rejection) => {
            debug!(peer = %request.peer, filename = %request.filename, reason = %rejection, "write request rejected");
            link.send(&Packet::error(rejection.code, rejection.message)).await?;
            return Ok(());
        }
    };

    let negotiated = negotiate(&request.options, request.options.tsize);
    let (mut exchange, block_size) = exchange_for(link, &negotiated, request, settings);
    let mut reply = if negotiated.is_empty() {
        Packet::Ack(0)
    } else {
        Packet::Oack(negotiated)
    };

    let mut block: u16 = 1;
    let mut received: u64 = 0;
    loop {
        let data = exchange.await_data(&reply, block).await?;
        if data.len() > block_size {
            exchange.abort(ErrorCode::IllegalOperation, "block larger than negotiated").await;
            return Err(TftpError::Unexpected(format!(
                "DATA block {block} carries {} bytes",
                data.len()
            )));
        }
        if let Err(e) = sink.writer.write_all(&data).await {
            exchange.abort(ErrorCode::DiskFull, "write failed").await;
            return Err(e.into());
        }
        received += data.len() as u64;
        reply = Packet::Ack(block);
        if data.len() < block_size {
            break;
        }
        block = block.wrapping_add(1);
    }

    sink.writer.shutdown().await?;
    exchange.link.send(&reply).await?;
    debug!(peer = %request.peer, filename = %request.filename, bytes = received, "write transfer complete");
    Ok(())
}

/// Read until `buf` is full or the reader is exhausted.
async fn fill<R: AsyncRead + Unpin + ?Sized>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
