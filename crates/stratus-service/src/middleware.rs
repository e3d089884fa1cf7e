//! Inbound rate limiting for the stratus-service API.
//!
//! Each client address gets its own sliding-window budget. Denied requests
//! are answered with 429 immediately and never reach a handler.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::state::AppState;

/// Path exempt from rate limiting so monitoring keeps working.
const HEALTH_PATH: &str = "/api/health";

/// Rate limiting middleware.
///
/// Limits requests per IP address within a sliding window.
/// Returns 429 Too Many Requests if the limit is exceeded.
///
/// Requests without connection info (in-process tests) share the
/// unspecified address.
pub async fn rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    if !state.config.security.rate_limit_enabled || request.uri().path() == HEALTH_PATH {
        return next.run(request).await;
    }

    let ip = client_ip(&request);
    match state.limiter.check(&ip) {
        Ok(()) => next.run(request).await,
        Err(wait) => {
            let limit = state.limiter.config().max_requests;
            let retry_after = retry_after_secs(wait);
            warn!("Rate limit exceeded for {} on {}", ip, request.uri().path());
            (
                StatusCode::TOO_MANY_REQUESTS,
                [
                    ("Retry-After", retry_after.to_string()),
                    ("X-RateLimit-Limit", limit.to_string()),
                    ("X-RateLimit-Remaining", "0".to_string()),
                ],
                Json(serde_json::json!({
                    "error": "Too many requests",
                    "kind": "rate_limited",
                    "retry_after": retry_after
                })),
            )
                .into_response()
        }
    }
}

fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Whole seconds to wait, rounded up and never zero.
pub(crate) fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}
