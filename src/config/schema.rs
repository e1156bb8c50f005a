//! Configuration schema definitions.
//!
//! [`ServerConfig`] is what the serving core consumes. [`AppConfig`] is the
//! file-level document read by the binary; it embeds a `ServerConfig` at the
//! top level and adds the sections only the binary cares about.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Dispatch;

use crate::observability::logging::LogFormat;

/// Bind address, timeout and on/off switch of one protocol.
///
/// `None` means unset: the resolver fills it in. `Some` is always kept as
/// given, including `Some(0.0.0.0:0)`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolSpec {
    pub addr: Option<SocketAddr>,

    /// Per-request timeout. In files: `timeout_secs`, fractional allowed.
    #[serde(
        rename = "timeout_secs",
        with = "duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    pub disabled: bool,
}

/// Configuration of the serving core.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub tftp: ProtocolSpec,
    pub http: ProtocolSpec,

    /// Multiplex every TFTP transfer on the listening port.
    ///
    /// Needed where ephemeral high ports are unreachable (for example a
    /// container without host networking). Slower, since all transfers share
    /// one receive loop.
    pub tftp_single_port: bool,

    /// Log sink. `None` resolves to a sink that discards everything.
    #[serde(skip)]
    pub log: Option<Dispatch>,
}

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub server: ServerConfig,

    pub observability: ObservabilityConfig,

    pub binaries: BinariesConfig,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Where boot binaries are loaded from.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BinariesConfig {
    /// Directory whose regular files are served by name.
    pub dir: PathBuf,
}

impl Default for BinariesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./binaries"),
        }
    }
}

mod duration_secs {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_f64(d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(D::Error::custom))
            .transpose()
    }
}
