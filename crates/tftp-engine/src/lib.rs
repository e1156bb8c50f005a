//! Async TFTP protocol engine.
//!
//! Implements RFC 1350 with the option extensions of RFC 2347, RFC 2348
//! (block size) and RFC 2349 (timeout, transfer size). The engine owns the
//! wire protocol: packet framing, option negotiation, retransmission and
//! block acknowledgement. What gets transferred is decided by a [`Handler`],
//! which receives one callback per read request and one per write request.
//!
//! # Port allocation
//!
//! By default every transfer is moved to its own ephemeral socket, as RFC 1350
//! prescribes. With [`Server::single_port`] all transfers share the listening
//! socket and are demultiplexed by peer address. Single-port mode works in
//! environments that block dynamically allocated high ports (containers
//! without host networking) at the cost of throughput: every datagram of every
//! transfer passes through the one receive loop.
//!
//! # Example
//!
//! ```ignore
//! use tftp_engine::{Handler, ReadSource, Rejection, Server, TransferRequest, WriteSink};
//!
//! struct Hello;
//!
//! #[async_trait::async_trait]
//! impl Handler for Hello {
//!     async fn read(&self, req: &TransferRequest) -> Result<ReadSource, Rejection> {
//!         match req.filename.as_str() {
//!             "hello.txt" => Ok(ReadSource::from_bytes("hello\n".into())),
//!             _ => Err(Rejection::not_found("no such file")),
//!         }
//!     }
//!
//!     async fn write(&self, _req: &TransferRequest) -> Result<WriteSink, Rejection> {
//!         Err(Rejection::access_violation("read-only"))
//!     }
//! }
//!
//! let socket = tokio::net::UdpSocket::bind("0.0.0.0:69").await?;
//! let server = Server::new(Hello).single_port(true);
//! let stop = server.shutdown_handle();
//! tokio::spawn(async move { server.serve(socket).await });
//! // ...
//! stop.shutdown();
//! ```

pub mod client;
pub mod error;
pub mod packet;
pub mod server;
mod transfer;

pub use client::{Client, Download};
pub use error::*;
pub use packet::{ErrorCode, Mode, Packet, Request, TransferOptions};
pub use server::*;
