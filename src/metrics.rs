/// Metrics for the user management service
///
/// Prometheus-compatible metrics for:
/// - HTTP request counts and latencies
/// - Account lifecycle outcomes
/// - Rate limiter rejections
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    /// Total HTTP requests by method, matched route and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("http_requests_total registers once");

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("http_request_duration_seconds registers once");

    /// Active HTTP requests
    pub static ref HTTP_REQUESTS_ACTIVE: IntGauge = register_int_gauge!(
        "http_requests_active",
        "Number of HTTP requests currently being processed"
    )
    .expect("http_requests_active registers once");

    /// Account lifecycle operations by operation and outcome kind
    pub static ref ACCOUNT_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "account_operations_total",
        "Total number of account lifecycle operations",
        &["operation", "outcome"]
    )
    .expect("account_operations_total registers once");

    /// Requests rejected by the rate limiter, by limiter scope
    pub static ref RATE_LIMITED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rate_limited_total",
        "Total number of requests rejected by rate limiting",
        &["scope"]
    )
    .expect("rate_limited_total registers once");
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> ApiResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| ApiError::Internal(format!("Metrics are not UTF-8: {}", e)))
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record the outcome of a lifecycle operation; `outcome` is `success` or an error kind
pub fn record_account_operation(operation: &str, outcome: &str) {
    ACCOUNT_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn record_rate_limited(scope: &str) {
    RATE_LIMITED_TOTAL.with_label_values(&[scope]).inc();
}

/// Middleware recording request count and latency.
///
/// Labels use the matched route template so per-login paths do not
/// explode label cardinality.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    HTTP_REQUESTS_ACTIVE.inc();
    let start = Instant::now();
    let response = next.run(request).await;
    HTTP_REQUESTS_ACTIVE.dec();

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}
