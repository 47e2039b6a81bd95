//! Prometheus metrics exporter (spec §9 "Metrics"), grounded on the
//! teacher's `metrics.rs` recorder-plus-handler shape, with the
//! MLS-specific counters swapped for this system's own: ingest,
//! enrichment, dispatcher fan-out and websocket connections.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder");

        metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
        metrics::describe_histogram!(
            "http_request_duration_seconds",
            "HTTP request duration in seconds"
        );
        metrics::describe_counter!("ingest_updates_total", "Total number of bot updates ingested");
        metrics::describe_counter!(
            "ingest_updates_rejected_total",
            "Total number of bot updates rejected at ingest"
        );
        metrics::describe_counter!(
            "changestream_events_processed_total",
            "Total number of change-stream events processed"
        );
        metrics::describe_counter!(
            "changestream_fanout_sent_total",
            "Total number of change-stream pushes delivered to subscribers"
        );
        metrics::describe_counter!(
            "enrich_jobs_completed_total",
            "Total number of enrichment jobs completed"
        );
        metrics::describe_counter!(
            "enrich_jobs_failed_total",
            "Total number of enrichment jobs that failed"
        );
        metrics::describe_gauge!(
            "websocket_connections_active",
            "Number of currently open websocket connections"
        );
        metrics::describe_counter!(
            "login_otp_requests_total",
            "Total number of OTP login requests"
        );
        metrics::describe_counter!(
            "login_otp_validations_total",
            "Total number of OTP validation attempts"
        );

        Self { handle }
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler mounted at `/metrics` (spec §9, gated behind `ENABLE_METRICS`
/// by the caller).
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (StatusCode::OK, handle.render())
}

/// Tracks request count and latency for every request through the
/// stack; mounted alongside [`crate::middleware::logging`].
pub async fn track_request_metrics(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> impl IntoResponse {
    let start = std::time::Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed();

    metrics::counter!("http_requests_total", 1);
    metrics::histogram!("http_request_duration_seconds", duration.as_secs_f64());

    response
}

pub fn record_ingest_update(accepted: bool) {
    if accepted {
        metrics::counter!("ingest_updates_total", 1);
    } else {
        metrics::counter!("ingest_updates_rejected_total", 1);
    }
}

pub fn record_changestream_event() {
    metrics::counter!("changestream_events_processed_total", 1);
}

pub fn record_fanout_sent() {
    metrics::counter!("changestream_fanout_sent_total", 1);
}

pub fn record_enrich_result(success: bool) {
    if success {
        metrics::counter!("enrich_jobs_completed_total", 1);
    } else {
        metrics::counter!("enrich_jobs_failed_total", 1);
    }
}

pub fn set_active_connections(count: usize) {
    metrics::gauge!("websocket_connections_active", count as f64);
}

pub fn record_otp_request() {
    metrics::counter!("login_otp_requests_total", 1);
}

pub fn record_otp_validation() {
    metrics::counter!("login_otp_validations_total", 1);
}

#[allow(dead_code)]
pub fn record_db_query(_query_type: &str, _duration: Duration, _success: bool) {}
