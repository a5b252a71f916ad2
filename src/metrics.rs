/// Metrics and telemetry for DocChase
///
/// Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - WhatsApp messages by kind
/// - Reminder stages dispatched
/// - Inbound document outcomes
/// - Background job execution

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
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, route, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    /// Active HTTP requests
    pub static ref HTTP_REQUESTS_ACTIVE: IntGauge = register_int_gauge!(
        "http_requests_active",
        "Number of HTTP requests currently being processed"
    )
    .unwrap();

    // ========== Messaging Metrics ==========

    /// Outbound WhatsApp messages sent by kind
    pub static ref MESSAGES_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        "docchase_messages_sent_total",
        "Outbound WhatsApp messages accepted by the provider",
        &["kind"]
    )
    .unwrap();

    /// Outbound WhatsApp sends that failed
    pub static ref MESSAGES_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "docchase_messages_failed_total",
        "Outbound WhatsApp messages rejected or not delivered to the provider",
        &["kind"]
    )
    .unwrap();

    /// Reminder stages performed by the sweep
    pub static ref REMINDERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "docchase_reminders_total",
        "Reminder stages performed",
        &["stage"]
    )
    .unwrap();

    // ========== Document Metrics ==========

    /// Inbound documents by outcome
    pub static ref DOCUMENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "docchase_documents_total",
        "Inbound documents processed by outcome",
        &["outcome"]
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
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

/// Record an outbound message accepted by the provider
pub fn record_message_sent(kind: &str) {
    MESSAGES_SENT_TOTAL.with_label_values(&[kind]).inc();
}

/// Record an outbound message that failed to send
pub fn record_message_failed(kind: &str) {
    MESSAGES_FAILED_TOTAL.with_label_values(&[kind]).inc();
}

/// Record a reminder stage
pub fn record_reminder(stage: &str) {
    REMINDERS_TOTAL.with_label_values(&[stage]).inc();
}

/// Record an inbound document outcome
pub fn record_document(outcome: &str) {
    DOCUMENTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}

/// Middleware recording request counts and latency per matched route
pub async fn track_http_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    HTTP_REQUESTS_ACTIVE.inc();
    let start = Instant::now();
    let response = next.run(request).await;
    HTTP_REQUESTS_ACTIVE.dec();

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/clients", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("http_requests_total"));
        assert!(metrics.contains("http_request_duration_seconds"));
    }

    #[test]
    fn test_record_messaging() {
        record_message_sent("reminder_1");
        record_message_failed("request");
        record_reminder("reminder_1");
        let metrics = render_metrics();
        assert!(metrics.contains("docchase_messages_sent_total"));
        assert!(metrics.contains("docchase_messages_failed_total"));
        assert!(metrics.contains("docchase_reminders_total{stage=\"reminder_1\"}"));
    }

    #[test]
    fn test_record_document() {
        record_document("converted");
        assert!(render_metrics().contains("docchase_documents_total{outcome=\"converted\"}"));
    }

    #[test]
    fn test_record_background_job() {
        record_background_job("reminder_sweep", "success", 1.5);
        let metrics = render_metrics();
        assert!(metrics.contains("background_jobs_total"));
        assert!(metrics.contains("background_job_duration_seconds"));
    }
}
