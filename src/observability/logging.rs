//! Structured logging.
//!
//! # Responsibilities
//! - Build the log sink handed to the server as a `tracing::Dispatch`
//! - Install it as the process-wide default in the binary
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` wins over the configured level

use serde::{Deserialize, Serialize};
use tracing::dispatcher::SetGlobalDefaultError;
use tracing::Dispatch;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Build a sink writing to stdout at `level` for this crate, the TFTP
/// engine and the HTTP middleware.
pub fn build_dispatch(level: &str, format: LogFormat) -> Dispatch {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "ipxe_serve={level},tftp_engine={level},tower_http={level}"
        ))
    });

    let (pretty, json) = match format {
        LogFormat::Pretty => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json);
    Dispatch::new(subscriber)
}

/// Make `dispatch` the global default.
pub fn init(dispatch: &Dispatch) -> Result<(), SetGlobalDefaultError> {
    tracing::dispatcher::set_global_default(dispatch.clone())
}
