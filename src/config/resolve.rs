//! Default filling for [`ServerConfig`].
//!
//! Merging is field by field: an unset field takes the default, a set field
//! is never touched. Merging an already merged configuration is a no-op.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::Dispatch;

use crate::config::schema::{ProtocolSpec, ServerConfig};
use crate::config::ConfigError;
use crate::Protocol;

/// TFTP listens on all interfaces, port 69.
pub const DEFAULT_TFTP_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 69);

/// HTTP listens on all interfaces, port 8080.
pub const DEFAULT_HTTP_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080);

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

impl ProtocolSpec {
    pub fn merge(self, defaults: &ProtocolSpec) -> ProtocolSpec {
        ProtocolSpec {
            addr: self.addr.or(defaults.addr),
            timeout: self.timeout.or(defaults.timeout),
            disabled: self.disabled || defaults.disabled,
        }
    }
}

impl ServerConfig {
    /// The documented defaults, with a discarding log sink.
    pub fn defaults() -> ServerConfig {
        ServerConfig {
            tftp: ProtocolSpec {
                addr: Some(DEFAULT_TFTP_ADDR),
                timeout: Some(DEFAULT_TIMEOUT),
                disabled: false,
            },
            http: ProtocolSpec {
                addr: Some(DEFAULT_HTTP_ADDR),
                timeout: Some(DEFAULT_TIMEOUT),
                disabled: false,
            },
            tftp_single_port: false,
            log: Some(Dispatch::none()),
        }
    }

    pub fn merge(self, defaults: &ServerConfig) -> ServerConfig {
        ServerConfig {
            tftp: self.tftp.merge(&defaults.tftp),
            http: self.http.merge(&defaults.http),
            tftp_single_port: self.tftp_single_port || defaults.tftp_single_port,
            log: self.log.or_else(|| defaults.log.clone()),
        }
    }
}

/// A [`ProtocolSpec`] with every field filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSpec {
    pub addr: SocketAddr,
    pub timeout: Duration,
    pub disabled: bool,
}

/// Effective configuration, immutable for the life of a server.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub tftp: ResolvedSpec,
    pub http: ResolvedSpec,
    pub tftp_single_port: bool,
    pub log: Dispatch,
}

impl From<ResolvedConfig> for ServerConfig {
    fn from(resolved: ResolvedConfig) -> Self {
        let spec = |s: ResolvedSpec| ProtocolSpec {
            addr: Some(s.addr),
            timeout: Some(s.timeout),
            disabled: s.disabled,
        };
        ServerConfig {
            tftp: spec(resolved.tftp),
            http: spec(resolved.http),
            tftp_single_port: resolved.tftp_single_port,
            log: Some(resolved.log),
        }
    }
}

/// Merge `config` with the defaults and return concrete values.
///
/// Caller input cannot make this fail; an error means a default is missing.
pub fn resolve(config: &ServerConfig) -> Result<ResolvedConfig, ConfigError> {
    let merged = config.clone().merge(&ServerConfig::defaults());
    Ok(ResolvedConfig {
        tftp: resolve_spec(&merged.tftp, Protocol::Tftp)?,
        http: resolve_spec(&merged.http, Protocol::Http)?,
        tftp_single_port: merged.tftp_single_port,
        log: merged.log.ok_or(ConfigError::Unresolved("log"))?,
    })
}

fn resolve_spec(spec: &ProtocolSpec, protocol: Protocol) -> Result<ResolvedSpec, ConfigError> {
    let (addr_field, timeout_field) = match protocol {
        Protocol::Tftp => ("tftp.addr", "tftp.timeout_secs"),
        Protocol::Http => ("http.addr", "http.timeout_secs"),
    };
    Ok(ResolvedSpec {
        addr: spec.addr.ok_or(ConfigError::Unresolved(addr_field))?,
        timeout: spec.timeout.ok_or(ConfigError::Unresolved(timeout_field))?,
        disabled: spec.disabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(config: &ServerConfig) -> (ProtocolSpec, ProtocolSpec, bool) {
        (config.tftp.clone(), config.http.clone(), config.tftp_single_port)
    }

    #[test]
    fn test_unset_fields_take_defaults() {
        let resolved = resolve(&ServerConfig::default()).unwrap();
        assert_eq!(resolved.tftp.addr, DEFAULT_TFTP_ADDR);
        assert_eq!(resolved.http.addr, DEFAULT_HTTP_ADDR);
        assert_eq!(resolved.tftp.timeout, Duration::from_secs(5));
        assert_eq!(resolved.http.timeout, Duration::from_secs(5));
        assert!(!resolved.tftp.disabled);
        assert!(!resolved.http.disabled);
        assert!(!resolved.tftp_single_port);
        assert!(resolved.log.is::<tracing::subscriber::NoSubscriber>());
    }

    #[test]
    fn test_set_fields_are_preserved() {
        let config = ServerConfig {
            tftp: ProtocolSpec {
                addr: Some("0.0.0.0:0".parse().unwrap()),
                timeout: None,
                disabled: true,
            },
            http: ProtocolSpec {
                addr: None,
                timeout: Some(Duration::from_millis(1500)),
                disabled: false,
            },
            tftp_single_port: true,
            log: None,
        };

        let resolved = resolve(&config).unwrap();
        assert_eq!(resolved.tftp.addr, "0.0.0.0:0".parse().unwrap());
        assert_eq!(resolved.tftp.timeout, DEFAULT_TIMEOUT);
        assert!(resolved.tftp.disabled);
        assert_eq!(resolved.http.addr, DEFAULT_HTTP_ADDR);
        assert_eq!(resolved.http.timeout, Duration::from_millis(1500));
        assert!(resolved.tftp_single_port);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let defaults = ServerConfig::defaults();
        let config = ServerConfig {
            http: ProtocolSpec {
                addr: Some("127.0.0.1:80".parse().unwrap()),
                ..Default::default()
            },
            ..Default::default()
        };

        let once = config.merge(&defaults);
        let twice = once.clone().merge(&defaults);
        assert_eq!(fields(&once), fields(&twice));
    }

    #[test]
    fn test_resolving_resolved_config_is_identity() {
        let config = ServerConfig {
            tftp: ProtocolSpec {
                addr: Some("10.0.0.1:1069".parse().unwrap()),
                ..Default::default()
            },
            ..Default::default()
        };
        let first = resolve(&config).unwrap();
        let second = resolve(&ServerConfig::from(first.clone())).unwrap();
        assert_eq!(first.tftp, second.tftp);
        assert_eq!(first.http, second.http);
        assert_eq!(first.tftp_single_port, second.tftp_single_port);
    }

    #[test]
    fn test_supplied_log_sink_is_kept() {
        let sink = Dispatch::new(tracing_subscriber::registry());
        let config = ServerConfig {
            log: Some(sink),
            ..Default::default()
        };
        let resolved = resolve(&config).unwrap();
        assert!(!resolved.log.is::<tracing::subscriber::NoSubscriber>());
    }

    #[test]
    fn test_unresolved_field_reported() {
        let spec = ProtocolSpec::default();
        let err = resolve_spec(&spec, Protocol::Http).unwrap_err();
        assert!(matches!(err, ConfigError::Unresolved("http.addr")));
    }
}
