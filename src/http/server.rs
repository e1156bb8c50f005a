//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the binary handler on every path
//! - Wire up middleware (log sink, request ID, tracing, timeout)
//! - Serve on a listener until the lifetime ends, then drain within budget

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::instrument::WithSubscriber;
use tracing::{info, warn, Dispatch};

use crate::config::ResolvedSpec;
use crate::error::Error;
use crate::http::handler::{serve_binary, AppState};
use crate::lifecycle::Shutdown;
use crate::repository::BinaryRepository;
use crate::Protocol;

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, Error> {
    TcpListener::bind(addr).await.map_err(|source| Error::Bind {
        protocol: Protocol::Http,
        addr,
        source,
    })
}

/// HTTP server for boot binaries.
pub struct HttpServer {
    router: Router,
    timeout: Duration,
}

impl HttpServer {
    /// `spec.timeout` bounds each request and the shutdown drain.
    pub fn new(spec: &ResolvedSpec, repository: Arc<dyn BinaryRepository>, log: Dispatch) -> Self {
        let state = AppState { repository };
        Self {
            router: Self::build_router(spec.timeout, state, log),
            timeout: spec.timeout,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(timeout: Duration, state: AppState, log: Dispatch) -> Router {
        Router::new()
            .route("/", get(serve_binary))
            .route("/{*path}", get(serve_binary))
            .with_state(state)
            .layer(TimeoutLayer::new(timeout))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(middleware::from_fn_with_state(log, with_log_sink))
    }

    /// Serve on `listener` until `shutdown` ends.
    ///
    /// After shutdown no new connections are accepted; in-flight requests get
    /// up to the HTTP timeout to finish before the server stops waiting.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), Error> {
        let addr = listener.local_addr().map_err(Error::Http)?;
        info!(address = %addr, timeout = ?self.timeout, "HTTP server starting");

        let signal = {
            let shutdown = shutdown.clone();
            async move { shutdown.wait().await }
        };
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let serving = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .into_future();
        tokio::pin!(serving);

        let result = tokio::select! {
            result = &mut serving => result,
            _ = shutdown.wait() => {
                match tokio::time::timeout(self.timeout, &mut serving).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(address = %addr, "HTTP drain budget exhausted, abandoning open connections");
                        Ok(())
                    }
                }
            }
        };

        result.map_err(Error::Http)?;
        info!(address = %addr, "HTTP server stopped");
        Ok(())
    }
}

/// Run each request under the server's log sink; connection tasks do not
/// inherit it.
async fn with_log_sink(State(log): State<Dispatch>, request: Request, next: Next) -> Response {
    next.run(request).with_subscriber(log).await
}
