//! Transport abstraction for the authenticated request pipeline
//!
//! Defines the request descriptor handed to the wire, the outcome model the
//! pipeline inspects, and the `Transport` trait that decouples pipeline logic
//! from the HTTP client. `HttpTransport` is the reqwest-backed implementation;
//! tests substitute scripted transports.
//!
//! Status classification lives here so every caller agrees on what counts as
//! a session-expired signal: only HTTP 401 does. Timeouts and connection
//! failures have their own kinds and never look like 401.

pub mod http;

pub use http::HttpTransport;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// An outgoing request, fully resolved (absolute URL) and ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// A response received from upstream, buffered.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Classification of a failed call.
///
/// Only `Unauthorized` drives the refresh-and-retry path:
/// - Unauthorized: upstream rejected the access token (401)
/// - Status: any other non-success status, passed through
/// - Timeout: the per-call deadline elapsed, passed through
/// - Network: connection or protocol failure, passed through
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureKind {
    #[error("unauthorized (401)")]
    Unauthorized,

    #[error("upstream returned {0}")]
    Status(StatusCode),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),
}

/// A failed call: what went wrong, the request that was sent, and the
/// upstream response when one was received (status failures only).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}")]
pub struct Failure {
    pub kind: FailureKind,
    pub request: RequestDescriptor,
    pub response: Option<Response>,
}

impl Failure {
    /// Build a failure for a non-success upstream status.
    pub fn from_response(request: RequestDescriptor, response: Response) -> Self {
        let kind = classify_status(response.status).unwrap_or(FailureKind::Status(response.status));
        Self {
            kind,
            request,
            response: Some(response),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == FailureKind::Unauthorized
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(|r| r.status)
    }
}

/// Result of sending one request through a transport.
pub type Outcome = std::result::Result<Response, Failure>;

/// Classify an upstream status. `None` means success (1xx-3xx).
pub fn classify_status(status: StatusCode) -> Option<FailureKind> {
    if status == StatusCode::UNAUTHORIZED {
        Some(FailureKind::Unauthorized)
    } else if status.is_client_error() || status.is_server_error() {
        Some(FailureKind::Status(status))
    } else {
        None
    }
}

/// Sends one request and reports the outcome.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).
/// Implementations must apply the per-call timeout themselves and report it as
/// `FailureKind::Timeout`.
pub trait Transport: Send + Sync {
    fn send(&self, request: RequestDescriptor) -> Pin<Box<dyn Future<Output = Outcome> + Send + '_>>;
}
