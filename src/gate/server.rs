//! HTTP server hosting the gate.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::Gate;
use crate::error::{Result, SubgateError};
use crate::proxy::Forwarder;

/// Build the router: `/healthz` for liveness, the prefix subtree through
/// the gate, and 404 for everything else.
pub fn router<F: Forwarder + 'static>(gate: Arc<Gate<F>>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .fallback(route_to_gate::<F>)
        .with_state(gate)
}

async fn health() -> &'static str {
    "ok"
}

async fn route_to_gate<F: Forwarder + 'static>(
    State(gate): State<Arc<Gate<F>>>,
    request: Request,
) -> Response {
    if !request.uri().path().starts_with(gate.prefix()) {
        return StatusCode::NOT_FOUND.into_response();
    }
    gate.handle(request).await
}

/// HTTP server for the subscription gate.
pub struct GateServer {
    /// Address to bind to
    addr: String,
    /// Routes to serve
    router: Router,
}

impl GateServer {
    /// Create a new server for the given listen address.
    pub fn new(addr: impl Into<String>, router: Router) -> Self {
        Self {
            addr: addr.into(),
            router,
        }
    }

    /// Bind the listen address and serve until `signal` resolves.
    pub async fn serve_with_shutdown<S>(self, signal: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind listen address");
            SubgateError::Io(e)
        })?;

        serve_on(listener, self.router, signal).await
    }
}

/// Serve `router` on an already bound listener until `signal` resolves.
///
/// Client socket addresses are recorded so the proxy can report them
/// upstream.
pub async fn serve_on<S>(listener: TcpListener, router: Router, signal: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "Starting subscription gate");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .await
    .map_err(|e| {
        error!(error = %e, "HTTP server failed");
        SubgateError::Io(e)
    })
}
