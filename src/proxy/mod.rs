//! Forwarding of admitted requests to the upstream service.

mod upstream;

pub use upstream::UpstreamProxy;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

/// Trait for forwarding implementations.
///
/// The gate hands over an admitted request untouched and relays whatever
/// comes back, including error responses the forwarder produces itself.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Forward a request upstream and return the response to relay.
    async fn forward(&self, request: Request<Body>) -> Response;
}
