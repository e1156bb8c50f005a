//! Binary download handler.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::observability::metrics::{self, Outcome};
use crate::repository::{BinaryRepository, BootName};
use crate::Protocol;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn BinaryRepository>,
}

/// Look the path up the same way a TFTP filename is looked up.
///
/// Anything that does not resolve to a stored binary is a 404.
pub async fn serve_binary(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    uri: Uri,
) -> Response {
    let name = BootName::parse(uri.path());
    let found = name
        .as_ref()
        .and_then(|name| state.repository.lookup(&name.file));

    match (name, found) {
        (Some(name), Some(data)) => {
            info!(
                peer = %peer,
                file = %name.file,
                mac = name.mac.map(tracing::field::display),
                size = data.len(),
                "serving binary over HTTP"
            );
            metrics::record_lookup(Protocol::Http, Outcome::Found);
            metrics::record_bytes(Protocol::Http, data.len() as u64);
            (
                [(header::CONTENT_TYPE, "application/octet-stream")],
                Body::from(data),
            )
                .into_response()
        }
        _ => {
            debug!(peer = %peer, path = %uri.path(), "HTTP binary not found");
            metrics::record_lookup(Protocol::Http, Outcome::NotFound);
            (StatusCode::NOT_FOUND, "not found").into_response()
        }
    }
}
