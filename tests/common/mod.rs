//! Shared utilities for integration tests.

#![allow(dead_code)]

use ipxe_serve::config::ProtocolSpec;
use ipxe_serve::{Error, MemoryRepository, Server, ServerConfig, Shutdown};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tftp_engine::Client;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;

pub const IPXE_EFI_LEN: usize = 3000;
pub const UNDIONLY_LEN: usize = 700;

/// Deterministic, non-repeating-per-block bytes.
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ seed).collect()
}

pub fn repository() -> Arc<MemoryRepository> {
    Arc::new(
        MemoryRepository::new()
            .with("ipxe.efi", payload(IPXE_EFI_LEN, 0x5a))
            .with("undionly.kpxe", payload(UNDIONLY_LEN, 0x17)),
    )
}

pub fn local() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// Short timeouts, loopback addresses.
pub fn config(tftp_single_port: bool) -> ServerConfig {
    let spec = ProtocolSpec {
        addr: Some(local()),
        timeout: Some(Duration::from_secs(1)),
        disabled: false,
    };
    ServerConfig {
        tftp: spec.clone(),
        http: spec,
        tftp_single_port,
        log: None,
    }
}

pub struct Running {
    pub tftp: SocketAddr,
    pub http: SocketAddr,
    pub lifetime: Shutdown,
    pub task: JoinHandle<Result<(), Error>>,
}

impl Running {
    /// End the lifetime and wait for the server to return.
    pub async fn stop(self) -> Result<(), Error> {
        self.lifetime.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }

    pub fn tftp_client(&self) -> Client {
        Client::new(self.tftp)
            .timeout(Duration::from_millis(500))
            .retries(3)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.http, path)
    }
}

/// Start a server on pre-bound loopback handles.
pub async fn start(config: ServerConfig) -> Running {
    let udp = UdpSocket::bind(local()).await.unwrap();
    let tcp = TcpListener::bind(local()).await.unwrap();
    let tftp = udp.local_addr().unwrap();
    let http = tcp.local_addr().unwrap();

    let server = Server::new(config, repository());
    let lifetime = Shutdown::new();
    let task = {
        let lifetime = lifetime.clone();
        tokio::spawn(async move { server.serve(&lifetime, Some(tcp), Some(udp)).await })
    };

    Running {
        tftp,
        http,
        lifetime,
        task,
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
