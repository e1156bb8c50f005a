//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ipxe_requests_total` (counter): lookups by protocol and outcome
//! - `ipxe_bytes_served_total` (counter): payload bytes handed to clients
//!
//! Without an installed recorder every update is a no-op.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

use crate::Protocol;

/// Result of one binary request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Found,
    NotFound,
    /// Refused before lookup (TFTP write requests).
    Rejected,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Found => "found",
            Outcome::NotFound => "not_found",
            Outcome::Rejected => "rejected",
        }
    }
}

/// Install the global recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "metrics endpoint listening");
    Ok(())
}

pub fn record_lookup(protocol: Protocol, outcome: Outcome) {
    ::metrics::counter!(
        "ipxe_requests_total",
        "protocol" => protocol.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_bytes(protocol: Protocol, bytes: u64) {
    ::metrics::counter!("ipxe_bytes_served_total", "protocol" => protocol.as_str()).increment(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_rendered() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            record_lookup(Protocol::Tftp, Outcome::Found);
            record_lookup(Protocol::Http, Outcome::NotFound);
            record_bytes(Protocol::Tftp, 3000);
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"ipxe_requests_total{protocol="tftp",outcome="found"} 1"#));
        assert!(rendered.contains(r#"ipxe_requests_total{protocol="http",outcome="not_found"} 1"#));
        assert!(rendered.contains(r#"ipxe_bytes_served_total{protocol="tftp"} 3000"#));
    }
}
