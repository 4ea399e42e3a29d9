//! Prometheus metrics exposition
//!
//! Proxy-level metrics recorded here:
//!
//! - `session_proxy_requests_total` (counter): labels `status`, `method`
//! - `session_proxy_request_duration_seconds` (histogram): label `status`
//! - `session_proxy_upstream_errors_total` (counter): label `error_type`
//!
//! The session pipeline records its own `session_*` counters through the same
//! global recorder.

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "session_proxy_request_duration_seconds";

/// 5ms up to 60s. Includes the refresh-and-retry path, which can take up to
/// three per-call timeouts.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// The duration metric renders as a histogram (`_bucket` lines) rather than
/// the default summary.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed proxy request with status code and HTTP method labels.
pub fn record_request(status: u16, method: &str, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("session_proxy_requests_total", "status" => status_str.clone(), "method" => method.to_string())
        .increment(1);
    metrics::histogram!(DURATION_METRIC, "status" => status_str).record(duration_secs);
}

/// Record an upstream failure that the proxy answered itself.
pub fn record_upstream_error(error_type: &str) {
    metrics::counter!("session_proxy_upstream_errors_total", "error_type" => error_type.to_string())
        .increment(1);
}
