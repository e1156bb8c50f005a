//! Startup orchestration.
//!
//! # Responsibilities
//! - Resolve configuration
//! - Obtain listeners, either by binding them or from the caller
//! - Start one serving task per enabled protocol
//! - Wait for the lifetime to end, then for every task to stop
//!
//! # Design Decisions
//! - Missing pre-bound handles are rejected before anything starts
//! - Binding happens inside the serving task, so a bind failure cancels the
//!   sibling like any other task failure
//! - Every task and request logs through the configured sink only

use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tracing::instrument::WithSubscriber;
use tracing::info;

use crate::config::{resolve, ResolvedConfig, ServerConfig};
use crate::error::Error;
use crate::http::{self, HttpServer};
use crate::lifecycle::{Shutdown, TaskGroup};
use crate::repository::BinaryRepository;
use crate::tftp::{self, TftpService};
use crate::Protocol;

/// Dual-protocol binary server.
pub struct Server {
    config: ServerConfig,
    repository: Arc<dyn BinaryRepository>,
}

impl Server {
    pub fn new(config: ServerConfig, repository: Arc<dyn BinaryRepository>) -> Self {
        Self { config, repository }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured addresses and serve until `lifetime` ends or a
    /// serving task fails.
    pub async fn listen_and_serve(&self, lifetime: &Shutdown) -> Result<(), Error> {
        let config = resolve(&self.config)?;
        let log = config.log.clone();
        self.run(lifetime, config, None, None)
            .with_subscriber(log)
            .await
    }

    /// Serve on caller-bound handles until `lifetime` ends or a serving task
    /// fails.
    ///
    /// Both handles are required, even for a disabled protocol; an absent
    /// one fails immediately with [`Error::MissingListener`]. The server
    /// owns and closes both handles from then on.
    pub async fn serve(
        &self,
        lifetime: &Shutdown,
        tcp: Option<TcpListener>,
        udp: Option<UdpSocket>,
    ) -> Result<(), Error> {
        let tcp = tcp.ok_or(Error::MissingListener {
            protocol: Protocol::Http,
        })?;
        let udp = udp.ok_or(Error::MissingListener {
            protocol: Protocol::Tftp,
        })?;

        let config = resolve(&self.config)?;
        let log = config.log.clone();
        self.run(lifetime, config, Some(tcp), Some(udp))
            .with_subscriber(log)
            .await
    }

    async fn run(
        &self,
        lifetime: &Shutdown,
        config: ResolvedConfig,
        tcp: Option<TcpListener>,
        udp: Option<UdpSocket>,
    ) -> Result<(), Error> {
        let mut group = TaskGroup::new(lifetime);

        if config.tftp.disabled {
            info!("TFTP disabled");
        } else {
            let service = TftpService::new(&config.tftp, config.tftp_single_port, Arc::clone(&self.repository));
            let addr = config.tftp.addr;
            let shutdown = group.shutdown().clone();
            group.spawn(Protocol::Tftp, async move {
                let socket = match udp {
                    Some(socket) => socket,
                    None => tftp::bind(addr).await?,
                };
                service.run(socket, shutdown).await
            });
        }

        if config.http.disabled {
            info!("HTTP disabled");
        } else {
            let server = HttpServer::new(&config.http, Arc::clone(&self.repository), config.log.clone());
            let addr = config.http.addr;
            let shutdown = group.shutdown().clone();
            group.spawn(Protocol::Http, async move {
                let listener = match tcp {
                    Some(listener) => listener,
                    None => http::bind(addr).await?,
                };
                server.run(listener, shutdown).await
            });
        }

        group.shutdown().wait().await;
        info!("shutting down");
        let result = group.wait().await;
        match &result {
            Ok(()) => info!("shutdown complete"),
            Err(e) => info!(error = %e, "stopped with error"),
        }
        result
    }
}
