// ============================================================================
// Prometheus Metrics
// ============================================================================
//
// ## Metrics Collected:
//
// 1. **HTTP Request Duration / Total**
//    - jofotara_http_request_duration_seconds, jofotara_http_requests_total
//    - Labels: method, path, status
//
// 2. **JoFotara API Calls**
//    - jofotara_api_calls_total (labels: operation, outcome)
//    - jofotara_api_call_duration_seconds (label: operation)
//
// ## Endpoints:
//
// - GET /metrics - Prometheus scrape endpoint
//
// ============================================================================

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::time::{Duration, Instant};

use crate::models::SubmissionStatus;

lazy_static! {
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "jofotara_http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "path", "status"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "jofotara_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    ).unwrap();

    /// Outbound calls to the JoFotara API by operation and outcome
    pub static ref JOFOTARA_CALLS_TOTAL: CounterVec = register_counter_vec!(
        "jofotara_api_calls_total",
        "Total number of JoFotara API calls",
        &["operation", "outcome"]
    ).unwrap();

    pub static ref JOFOTARA_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "jofotara_api_call_duration_seconds",
        "JoFotara API call latency in seconds, token fetch included",
        &["operation"],
        vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();
}

/// Collapse the invoice name in `/api/invoices/<name>/...` so label
/// cardinality stays bounded.
///
/// Example: /api/invoices/ACC-SINV-2024-00001/send -> /api/invoices/:name/send
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut normalized = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        let is_name = i == 2
            && segments[0] == "api"
            && segments[1] == "invoices"
            && *segment != "on-submit";
        normalized.push(if is_name { ":name" } else { segment });
    }

    format!("/{}", normalized.join("/"))
}

pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[method.as_str(), &path, &status])
        .observe(duration.as_secs_f64());
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), &path, &status])
        .inc();

    tracing::debug!(
        target: "metrics",
        method = %method,
        path = %path,
        status = %status,
        duration_ms = %duration.as_millis(),
        "HTTP request completed"
    );

    response
}

/// Prometheus scrape endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

/// Record one JoFotara API call (submit, cancel or query).
pub fn record_jofotara_call(operation: &str, outcome: SubmissionStatus, elapsed: Duration) {
    JOFOTARA_CALLS_TOTAL
        .with_label_values(&[operation, outcome.as_str()])
        .inc();
    JOFOTARA_CALL_DURATION
        .with_label_values(&[operation])
        .observe(elapsed.as_secs_f64());
}
