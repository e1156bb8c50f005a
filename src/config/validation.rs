//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, parsable addresses and levels)
//! - Reject configurations that would serve nothing
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::config::schema::{AppConfig, ProtocolSpec};
use crate::Protocol;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{protocol} timeout must be greater than zero")]
    ZeroTimeout { protocol: Protocol },

    #[error("both TFTP and HTTP are disabled")]
    NothingToServe,

    #[error("binaries directory must not be empty")]
    EmptyBinariesDir,

    #[error("invalid metrics address `{0}`")]
    InvalidMetricsAddress(String),

    #[error("invalid log level `{0}`")]
    InvalidLogLevel(String),
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    check_timeout(&server.tftp, Protocol::Tftp, &mut errors);
    check_timeout(&server.http, Protocol::Http, &mut errors);

    if server.tftp.disabled && server.http.disabled {
        errors.push(ValidationError::NothingToServe);
    }

    if config.binaries.dir.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyBinariesDir);
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if LevelFilter::from_str(&observability.log_level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_timeout(spec: &ProtocolSpec, protocol: Protocol, errors: &mut Vec<ValidationError>) {
    if !spec.disabled && spec.timeout.is_some_and(|t| t.is_zero()) {
        errors.push(ValidationError::ZeroTimeout { protocol });
    }
}
