//! Admission decision in front of the forwarder.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::token::extract_token;
use crate::proxy::Forwarder;
use crate::ratelimit::TokenLimiter;

/// Body sent when no token can be derived from the path.
pub const INVALID_LINK_MESSAGE: &str = "invalid subscription link\n";
/// Body sent when a token has used up its window.
pub const LIMIT_EXCEEDED_MESSAGE: &str = "subscription update limit exceeded\n";

/// Gates subscription requests on a per-token quota.
///
/// Each request gets exactly one extraction and at most one limiter call.
/// Requests without a token are rejected before the limiter is consulted,
/// so malformed links never touch quota state.
pub struct Gate<F: Forwarder> {
    /// Path prefix the token follows
    prefix: String,
    /// Shared quota state
    limiter: Arc<TokenLimiter>,
    /// Where admitted requests go
    forwarder: F,
}

impl<F: Forwarder> Gate<F> {
    /// Create a new gate.
    pub fn new(prefix: impl Into<String>, limiter: Arc<TokenLimiter>, forwarder: F) -> Self {
        Self {
            prefix: prefix.into(),
            limiter,
            forwarder,
        }
    }

    /// Get the token path prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Get the limiter this gate counts against.
    pub fn limiter(&self) -> &Arc<TokenLimiter> {
        &self.limiter
    }

    /// Decide on a request and either reject it or forward it unmodified.
    #[instrument(skip(self, request), fields(method = %request.method(), path = %request.uri().path()))]
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let token = match extract_token(request.uri().path(), &self.prefix) {
            Some(token) => token.to_owned(),
            None => {
                debug!("Rejecting request without subscription token");
                return plain_text(StatusCode::BAD_REQUEST, INVALID_LINK_MESSAGE);
            }
        };

        let decision = self.limiter.allow(&token);
        if !decision.admitted {
            warn!(token = %token, count = decision.count, "Subscription update limit exceeded");
            return plain_text(StatusCode::TOO_MANY_REQUESTS, LIMIT_EXCEEDED_MESSAGE);
        }

        info!(token = %token, count = decision.count, "Subscription update admitted");
        self.forwarder.forward(request).await
    }
}

fn plain_text(status: StatusCode, message: &'static str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        message,
    )
        .into_response()
}
