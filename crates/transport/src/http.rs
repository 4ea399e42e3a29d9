//! reqwest-backed transport
//!
//! Sends a `RequestDescriptor` with a fixed per-call timeout and buffers the
//! upstream body so the outcome can be inspected and replayed to the caller.

use crate::{Failure, FailureKind, Outcome, RequestDescriptor, Response, Transport, classify_status};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-call timeout applied to every send.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, request: RequestDescriptor) -> Outcome {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone())
            .timeout(self.timeout);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let upstream = match builder.send().await {
            Ok(r) => r,
            Err(e) => return Err(self.transport_failure(request, e)),
        };

        let status = upstream.status();
        let headers = upstream.headers().clone();
        let body = match upstream.bytes().await {
            Ok(b) => b,
            Err(e) => return Err(self.transport_failure(request, e)),
        };

        let response = Response {
            status,
            headers,
            body,
        };
        match classify_status(status) {
            None => Ok(response),
            Some(kind) => {
                debug!(status = status.as_u16(), url = %request.url, "upstream returned failure status");
                Err(Failure {
                    kind,
                    request,
                    response: Some(response),
                })
            }
        }
    }

    fn transport_failure(&self, request: RequestDescriptor, e: reqwest::Error) -> Failure {
        let kind = if e.is_timeout() {
            warn!(url = %request.url, timeout_ms = self.timeout.as_millis() as u64, "upstream call timed out");
            FailureKind::Timeout(self.timeout)
        } else {
            warn!(url = %request.url, error = %e, "upstream call failed");
            FailureKind::Network(e.to_string())
        };
        Failure {
            kind,
            request,
            response: None,
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: RequestDescriptor) -> Pin<Box<dyn Future<Output = Outcome> + Send + '_>> {
        Box::pin(self.execute(request))
    }
}
