//! HTTP proxy logic
//!
//! Receives inbound requests, strips hop-by-hop headers, and forwards them to
//! `<base_url><path-and-query>` through the authenticated pipeline. Whatever
//! `Authorization` the client sent is replaced with the session token.
//! Upstream responses are returned verbatim, including error statuses and the
//! original 401 when the session could not be refreshed.

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reqwest::header::{HOST, HeaderMap};
use session_pipeline::AuthPipeline;
use tracing::{error, instrument, warn};
use transport::{FailureKind, RequestDescriptor};

use crate::metrics;

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

/// Largest request body the proxy will buffer.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state passed to the proxy handler via axum State extractor
#[derive(Clone)]
pub struct ProxyState {
    pub pipeline: Arc<AuthPipeline>,
    pub base_url: String,
}

/// JSON error response: {"error":{"type":"proxy_error","message":"...","request_id":"req_..."}}
fn error_response(status: StatusCode, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": "proxy_error",
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Relay a buffered upstream response, minus hop-by-hop headers.
fn relay(upstream: transport::Response, request_id: &str) -> Response {
    let mut response = Response::builder().status(upstream.status);
    for (name, value) in &upstream.headers {
        if !is_hop_by_hop(name.as_str()) {
            response = response.header(name, value);
        }
    }
    response
        .body(axum::body::Body::from(upstream.body))
        .unwrap_or_else(|e| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("response build error: {e}"),
                request_id,
            )
        })
}

/// Copy inbound headers for the upstream request. `host` belongs to the
/// inbound connection and is dropped along with hop-by-hop headers.
fn forward_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in inbound {
        if *name != HOST && !is_hop_by_hop(name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Proxy an inbound request to upstream through the session pipeline.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn proxy_request(
    state: &ProxyState,
    request: axum::http::Request<axum::body::Body>,
    request_id: String,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();

    let url = match request.uri().path_and_query() {
        Some(pq) => format!("{}{}", state.base_url, pq),
        None => state.base_url.clone(),
    };
    let headers = forward_headers(request.headers());

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "failed to read request body");
            metrics::record_request(400, method.as_str(), started.elapsed().as_secs_f64());
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("invalid request body: {e}"),
                &request_id,
            );
        }
    };

    let mut descriptor = RequestDescriptor::new(method.clone(), url).with_headers(headers);
    if !body.is_empty() {
        descriptor = descriptor.with_body(body);
    }

    let response = match state.pipeline.execute(descriptor).await {
        Ok(upstream) => relay(upstream, &request_id),
        Err(failure) => match (failure.kind, failure.response) {
            (_, Some(upstream)) => relay(upstream, &request_id),
            (FailureKind::Timeout(timeout), None) => {
                metrics::record_upstream_error("timeout");
                error!(timeout_ms = timeout.as_millis() as u64, "upstream timeout");
                error_response(
                    StatusCode::GATEWAY_TIMEOUT,
                    &format!("upstream timeout after {}ms", timeout.as_millis()),
                    &request_id,
                )
            }
            (FailureKind::Network(msg), None) => {
                metrics::record_upstream_error("network");
                error!(error = %msg, "upstream request failed");
                error_response(
                    StatusCode::BAD_GATEWAY,
                    &format!("upstream error: {msg}"),
                    &request_id,
                )
            }
            (kind, None) => {
                metrics::record_upstream_error("other");
                warn!(error = %kind, "upstream failure without response");
                error_response(StatusCode::BAD_GATEWAY, &kind.to_string(), &request_id)
            }
        },
    };

    metrics::record_request(
        response.status().as_u16(),
        method.as_str(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}
