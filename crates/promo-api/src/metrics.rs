//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

use promo_models::SweepReport;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "promo_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "promo_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "promo_http_requests_in_flight";

    // Submission metrics
    pub const SUBMISSIONS_TOTAL: &str = "promo_submissions_total";

    // Sweep metrics
    pub const SWEEP_JOBS_CHECKED_TOTAL: &str = "promo_sweep_jobs_checked_total";
    pub const SWEEP_JOBS_UPDATED_TOTAL: &str = "promo_sweep_jobs_updated_total";
    pub const SWEEP_JOBS_TIMED_OUT_TOTAL: &str = "promo_sweep_jobs_timed_out_total";
    pub const SWEEP_ERRORS_TOTAL: &str = "promo_sweep_errors_total";

    // Guarded-write metrics
    pub const GUARD_CONFLICTS_TOTAL: &str = "promo_guard_conflicts_total";

    // Webhook metrics
    pub const WEBHOOKS_RECEIVED_TOTAL: &str = "promo_webhooks_received_total";

    // Result proxy metrics
    pub const URL_REFRESHES_TOTAL: &str = "promo_url_refreshes_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "promo_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a submission attempt outcome (`submitted`/`completed`/`failed`).
pub fn record_submission(provider: &str, outcome: &str) {
    let labels = [
        ("provider", provider.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::SUBMISSIONS_TOTAL, &labels).increment(1);
}

/// Record one sweep's aggregate counts.
pub fn record_sweep(report: &SweepReport) {
    counter!(names::SWEEP_JOBS_CHECKED_TOTAL).increment(report.checked as u64);
    counter!(names::SWEEP_JOBS_UPDATED_TOTAL).increment(report.updated as u64);
    counter!(names::SWEEP_JOBS_TIMED_OUT_TOTAL).increment(report.timed_out as u64);
    counter!(names::SWEEP_ERRORS_TOTAL).increment(report.errors as u64);
}

/// Record a guarded write skipped because another writer got there first.
pub fn record_guard_conflict(field: &str) {
    let labels = [("field", field.to_string())];
    counter!(names::GUARD_CONFLICTS_TOTAL, &labels).increment(1);
}

/// Record a received webhook (`applied`/`skipped`/`unknown_job`/`malformed`).
pub fn record_webhook(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::WEBHOOKS_RECEIVED_TOTAL, &labels).increment(1);
}

/// Record a result-proxy URL refresh (`refreshed`/`expired`).
pub fn record_url_refresh(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::URL_REFRESHES_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    // Normalize job IDs (alphanumeric strings after /jobs/)
    let path = regex_lite::Regex::new(r"/jobs/[a-zA-Z0-9_-]+")
        .unwrap()
        .replace_all(path, "/jobs/:job_id");
    // Replace remaining UUIDs and numeric IDs with placeholders
    let path = regex_lite::Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .unwrap()
        .replace_all(&path, ":id");
    let path = regex_lite::Regex::new(r"/[0-9]+(/|$)")
        .unwrap()
        .replace_all(&path, "/:id$1");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    // Increment in-flight counter
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    // Decrement in-flight counter
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
