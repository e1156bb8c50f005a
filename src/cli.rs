//! Command-line surface of the `ipxe-serve` binary.
//!
//! Flags override the configuration file, which overrides the built-in
//! defaults.

use clap::error::ErrorKind;
use clap::Parser;
use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{load_config, validate_config, AppConfig, ConfigError, ValidationError};
use crate::lifecycle::{Server, Shutdown};
use crate::observability::logging::{self, LogFormat};
use crate::observability::metrics::init_metrics;
use crate::repository::MemoryRepository;

#[derive(Debug, Parser)]
#[command(name = "ipxe-serve", version)]
#[command(about = "Serve iPXE binaries over TFTP and HTTP", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// TFTP bind address [default: 0.0.0.0:69]
    #[arg(long, value_name = "ADDR")]
    pub tftp_addr: Option<SocketAddr>,

    /// TFTP retransmission timeout in seconds [default: 5]
    #[arg(long, value_name = "SECS", value_parser = parse_secs)]
    pub tftp_timeout: Option<Duration>,

    #[arg(long)]
    pub disable_tftp: bool,

    /// Serve every TFTP transfer on the bind port (slower; for restricted networks)
    #[arg(long)]
    pub tftp_single_port: bool,

    /// HTTP bind address [default: 0.0.0.0:8080]
    #[arg(long, value_name = "ADDR")]
    pub http_addr: Option<SocketAddr>,

    /// HTTP request and shutdown timeout in seconds [default: 5]
    #[arg(long, value_name = "SECS", value_parser = parse_secs)]
    pub http_timeout: Option<Duration>,

    #[arg(long)]
    pub disable_http: bool,

    /// Directory of binaries to serve
    #[arg(long, value_name = "DIR")]
    pub binaries_dir: Option<PathBuf>,

    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Enable the Prometheus endpoint on this address
    #[arg(long, value_name = "ADDR")]
    pub metrics_address: Option<SocketAddr>,
}

impl Cli {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        let server = &mut config.server;
        if let Some(addr) = self.tftp_addr {
            server.tftp.addr = Some(addr);
        }
        if let Some(timeout) = self.tftp_timeout {
            server.tftp.timeout = Some(timeout);
        }
        if self.disable_tftp {
            server.tftp.disabled = true;
        }
        if self.tftp_single_port {
            server.tftp_single_port = true;
        }
        if let Some(addr) = self.http_addr {
            server.http.addr = Some(addr);
        }
        if let Some(timeout) = self.http_timeout {
            server.http.timeout = Some(timeout);
        }
        if self.disable_http {
            server.http.disabled = true;
        }

        if let Some(dir) = &self.binaries_dir {
            config.binaries.dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
        if let Some(addr) = self.metrics_address {
            config.observability.metrics_enabled = true;
            config.observability.metrics_address = addr.to_string();
        }
    }
}

fn parse_secs(value: &str) -> Result<Duration, String> {
    let secs: f64 = value.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(#[from] clap::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to load binaries from {}: {source}", dir.display())]
    Binaries {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error(transparent)]
    Serve(#[from] crate::Error),
}

/// Parse `args`, set up logging, metrics and the repository, then serve
/// until `lifetime` ends.
///
/// `--help` and `--version` print and return `Ok`.
pub async fn execute<I, T>(lifetime: &Shutdown, args: I) -> Result<(), CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return Ok(());
        }
        Err(e) => return Err(CliError::Usage(e)),
    };

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    let observability = &config.observability;
    let log = logging::build_dispatch(&observability.log_level, observability.log_format);
    if logging::init(&log).is_err() {
        warn!("global log subscriber already installed");
    }
    config.server.log = Some(log);

    if observability.metrics_enabled {
        let addr: SocketAddr = observability.metrics_address.parse().map_err(|_| {
            ConfigError::Validation(vec![ValidationError::InvalidMetricsAddress(
                observability.metrics_address.clone(),
            )])
        })?;
        init_metrics(addr)?;
    }

    let dir = config.binaries.dir.clone();
    let repository = MemoryRepository::from_dir(&dir).map_err(|source| CliError::Binaries {
        dir: dir.clone(),
        source,
    })?;
    if repository.is_empty() {
        warn!(dir = %dir.display(), "no binaries found, every request will be answered with not found");
    } else {
        info!(dir = %dir.display(), binaries = ?repository.names(), "binaries loaded");
    }

    let server = Server::new(config.server, Arc::new(repository));
    server.listen_and_serve(lifetime).await?;
    Ok(())
}
