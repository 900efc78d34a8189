//! HTTP proxy logic
//!
//! Receives inbound requests, strips hop-by-hop and credential headers, and
//! sends the call through the gateway, which attaches the session's bearer
//! token and recovers from expiry. Upstream responses come back verbatim
//! (including error status codes from upstream).

use std::sync::atomic::Ordering;
use std::time::Instant;

use auth_gateway::{ApiRequest, AuthGateway};
use axum::http::StatusCode;
use axum::response::Response;
use tracing::{error, instrument, warn};

use crate::error::{Error, Result};
use crate::metrics::{self, ServiceMetrics};

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Inbound headers the proxy replaces with its own
const OWNED_HEADERS: &[&str] = &["authorization", "host", "content-length"];

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state passed to the proxy handler via axum State extractor
#[derive(Clone)]
pub struct ProxyState {
    pub gateway: AuthGateway,
    pub metrics: ServiceMetrics,
}

/// Decrements the in-flight gauge when the request finishes, however it ends.
struct InFlight<'a>(&'a ServiceMetrics);

impl<'a> InFlight<'a> {
    fn enter(metrics: &'a ServiceMetrics) -> Self {
        metrics.in_flight.fetch_add(1, Ordering::Relaxed);
        Self(metrics)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Proxy an inbound request to upstream through the gateway.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn proxy_request(
    state: &ProxyState,
    request: axum::http::Request<axum::body::Body>,
    request_id: String,
) -> Response {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    let _in_flight = InFlight::enter(&state.metrics);
    let started = Instant::now();
    let method = request.method().to_string();

    let response = match forward(&state.gateway, request).await {
        Ok(response) => response,
        Err(e) => {
            state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
            match e.status() {
                StatusCode::UNAUTHORIZED => warn!(error = %e, "session unavailable"),
                _ => error!(error = %e, "proxy request failed"),
            }
            e.into_response_with_id(&request_id)
        }
    };

    metrics::record_request(
        response.status().as_u16(),
        &method,
        started.elapsed().as_secs_f64(),
    );
    response
}

async fn forward(
    gateway: &AuthGateway,
    request: axum::http::Request<axum::body::Body>,
) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| "/".to_owned());

    let mut call = ApiRequest::new(parts.method, path);
    for (name, value) in &parts.headers {
        if !is_hop_by_hop(name.as_str()) && !is_owned(name.as_str()) {
            call.headers_mut().append(name.clone(), value.clone());
        }
    }

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| Error::InvalidBody(e.to_string()))?;
    if !body.is_empty() {
        call = call.body(body);
    }

    let (status, headers, body) = gateway.send(call).await?.into_parts();

    let mut response = Response::builder().status(status);
    for (name, value) in &headers {
        if !is_hop_by_hop(name.as_str()) {
            response = response.header(name, value);
        }
    }
    response
        .body(axum::body::Body::from(body))
        .map_err(|e| Error::Response(e.to_string()))
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

fn is_owned(name: &str) -> bool {
    OWNED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}
