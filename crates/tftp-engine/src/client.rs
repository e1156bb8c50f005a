//! Minimal TFTP client.
//!
//! Enough of RFC 1350 and its option extensions to fetch and upload files in
//! octet mode. Used by integration tests and diagnostics.

use bytes::{Bytes, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

use crate::error::{Result, TftpError};
use crate::packet::{Mode, Packet, Request, TransferOptions, DEFAULT_BLOCK_SIZE};
use crate::server::{DEFAULT_RETRIES, RECV_BUFFER};

/// Result of a completed download.
#[derive(Debug, Clone)]
pub struct Download {
    pub data: Bytes,
    /// Options acknowledged by the server, empty if it sent no OACK
    pub negotiated: TransferOptions,
}

#[derive(Debug, Clone)]
pub struct Client {
    server: SocketAddr,
    timeout: Duration,
    retries: u32,
    options: TransferOptions,
}

impl Client {
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            timeout: Duration::from_secs(1),
            retries: DEFAULT_RETRIES,
            options: TransferOptions::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Ask for a non-default block size.
    pub fn block_size(mut self, size: u16) -> Self {
        self.options.blksize = Some(size);
        self
    }

    /// Ask the server to report (read) or announce (write) the transfer size.
    pub fn transfer_size(mut self) -> Self {
        self.options.tsize = Some(0);
        self
    }

    /// Download `filename`.
    pub async fn get(&self, filename: &str) -> Result<Download> {
        let mut session = Session::open(self, filename).await?;
        let rrq = Packet::Rrq(Request {
            filename: filename.to_string(),
            mode: Mode::Octet,
            options: self.options,
        });

        let mut negotiated = TransferOptions::default();
        let mut reply = session
            .exchange(&rrq, |p| {
                matches!(p, Packet::Oack(_) | Packet::Data { block: 1, .. })
            })
            .await?;
        if let Packet::Oack(options) = reply {
            negotiated = options;
            reply = session
                .exchange(&Packet::Ack(0), |p| matches!(p, Packet::Data { block: 1, .. }))
                .await?;
        }

        let block_size = negotiated.blksize.unwrap_or(DEFAULT_BLOCK_SIZE) as usize;
        let mut received = BytesMut::new();
        loop {
            let (block, data) = match reply {
                Packet::Data { block, data } => (block, data),
                other => return Err(TftpError::Unexpected(format!("{other:?}"))),
            };
            received.extend_from_slice(&data);
            let ack = Packet::Ack(block);
            if data.len() < block_size {
                session.send(&ack).await?;
                break;
            }
            let next = block.wrapping_add(1);
            reply = session
                .exchange(&ack, |p| matches!(p, Packet::Data { block, .. } if *block == next))
                .await?;
        }

        Ok(Download {
            data: received.freeze(),
            negotiated,
        })
    }

    /// Upload `data` as `filename`.
    pub async fn put(&self, filename: &str, data: Bytes) -> Result<()> {
        let mut session = Session::open(self, filename).await?;
        let mut options = self.options;
        if options.tsize.is_some() {
            options.tsize = Some(data.len() as u64);
        }
        let wrq = Packet::Wrq(Request {
            filename: filename.to_string(),
            mode: Mode::Octet,
            options,
        });

        let reply = session
            .exchange(&wrq, |p| matches!(p, Packet::Ack(0) | Packet::Oack(_)))
            .await?;
        let block_size = match reply {
            Packet::Oack(negotiated) => negotiated.blksize.unwrap_or(DEFAULT_BLOCK_SIZE),
            _ => DEFAULT_BLOCK_SIZE,
        } as usize;

        let mut block: u16 = 1;
        let mut offset = 0;
        loop {
            let end = (offset + block_size).min(data.len());
            let chunk = data.slice(offset..end);
            let last = chunk.len() < block_size;
            let packet = Packet::Data { block, data: chunk };
            session
                .exchange(&packet, |p| matches!(p, Packet::Ack(acked) if *acked == block))
                .await?;
            if last {
                return Ok(());
            }
            offset = end;
            block = block.wrapping_add(1);
        }
    }
}

/// One client transfer: a local socket plus the server's transfer ID once known.
struct Session<'a> {
    client: &'a Client,
    filename: &'a str,
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    buf: Vec<u8>,
}

impl<'a> Session<'a> {
    async fn open(client: &'a Client, filename: &'a str) -> Result<Self> {
        let local: SocketAddr = if client.server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TftpError::BindFailed { addr: local, source })?;
        Ok(Self {
            client,
            filename,
            socket,
            peer: None,
            buf: vec![0u8; RECV_BUFFER],
        })
    }

    async fn send(&self, packet: &Packet) -> Result<()> {
        let dest = self.peer.unwrap_or(self.client.server);
        self.socket.send_to(&packet.encode(), dest).await?;
        Ok(())
    }

    /// Send `packet` until a reply satisfying `accept` arrives.
    async fn exchange(&mut self, packet: &Packet, accept: impl Fn(&Packet) -> bool) -> Result<Packet> {
        for _ in 0..=self.client.retries {
            self.send(packet).await?;
            let deadline = Instant::now() + self.client.timeout;
            while let Some((reply, from)) = self.recv_until(deadline).await? {
                if let Packet::Error { code, message } = reply {
                    return Err(TftpError::Remote { code, message });
                }
                if accept(&reply) {
                    self.peer = Some(from);
                    return Ok(reply);
                }
            }
        }
        Err(TftpError::Timeout {
            filename: self.filename.to_string(),
        })
    }

    async fn recv_until(&mut self, deadline: Instant) -> Result<Option<(Packet, SocketAddr)>> {
        loop {
            let (len, from) = match timeout_at(deadline, self.socket.recv_from(&mut self.buf)).await {
                Err(_) => return Ok(None),
                Ok(received) => received?,
            };
            let expected = match self.peer {
                Some(peer) => from == peer,
                None => from.ip() == self.client.server.ip(),
            };
            if !expected {
                continue;
            }
            if let Ok(packet) = Packet::parse(&self.buf[..len]) {
                return Ok(Some((packet, from)));
            }
        }
    }
}
