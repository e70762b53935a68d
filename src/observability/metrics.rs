use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

// ---------------------------------------------------------------------------
// Metrics catalog
// ---------------------------------------------------------------------------

/// Register all metric descriptors at startup.
///
/// This must be called once before any metrics are recorded.
/// Descriptors provide human-readable descriptions for Prometheus.
pub fn describe_all_metrics() {
    // -- HTTP --
    describe_counter!(
        "videoflow_http_requests_total",
        "HTTP requests by service, route and status class"
    );
    describe_histogram!(
        "videoflow_http_request_duration_seconds",
        "Time from request received to response headers sent"
    );

    // -- Streaming bodies --
    describe_counter!(
        "videoflow_stream_bytes_total",
        "Video bytes relayed to clients"
    );
    describe_gauge!(
        "videoflow_stream_active",
        "Response bodies currently streaming"
    );
    describe_counter!(
        "videoflow_stream_completed_total",
        "Response bodies by outcome (complete, aborted, error)"
    );

    // -- Object store --
    describe_histogram!(
        "videoflow_store_fetch_duration_seconds",
        "Object store GET latency to first byte"
    );
    describe_counter!(
        "videoflow_store_errors_total",
        "Object store fetch failures by type"
    );

    // -- Metadata resolver --
    describe_histogram!(
        "videoflow_resolver_lookup_duration_seconds",
        "Metadata lookup latency"
    );
    describe_counter!(
        "videoflow_resolver_errors_total",
        "Metadata lookup failures by type"
    );

    // -- Storage service hop --
    describe_histogram!(
        "videoflow_upstream_request_duration_seconds",
        "Storage service latency to response headers"
    );
    describe_counter!(
        "videoflow_upstream_errors_total",
        "Storage service failures by type"
    );

    // -- System --
    describe_gauge!("videoflow_uptime_seconds", "Process uptime");
    describe_counter!(
        "videoflow_panic_total",
        "Total panics caught (should always be 0)"
    );
    describe_gauge!(
        "videoflow_shutdown_in_progress",
        "1 if graceful shutdown is in progress, 0 otherwise"
    );
}

// ---------------------------------------------------------------------------
// Metric recording helpers
// ---------------------------------------------------------------------------

// -- HTTP --

pub fn inc_http_request(service: &str, route: &str, status: u16) {
    counter!(
        "videoflow_http_requests_total",
        "service" => service.to_string(),
        "route" => route.to_string(),
        "status" => status_class(status)
    )
    .increment(1);
}

pub fn record_http_request_duration(service: &str, route: &str, seconds: f64) {
    histogram!(
        "videoflow_http_request_duration_seconds",
        "service" => service.to_string(),
        "route" => route.to_string()
    )
    .record(seconds);
}

// -- Streaming bodies --

pub fn add_stream_bytes(service: &str, bytes: u64) {
    counter!("videoflow_stream_bytes_total", "service" => service.to_string()).increment(bytes);
}

pub fn inc_stream_active(service: &str) {
    gauge!("videoflow_stream_active", "service" => service.to_string()).increment(1.0);
}

pub fn dec_stream_active(service: &str) {
    gauge!("videoflow_stream_active", "service" => service.to_string()).decrement(1.0);
}

pub fn inc_stream_completed(service: &str, outcome: &str) {
    counter!(
        "videoflow_stream_completed_total",
        "service" => service.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// -- Object store --

pub fn record_store_fetch_duration(seconds: f64) {
    histogram!("videoflow_store_fetch_duration_seconds").record(seconds);
}

pub fn inc_store_error(error_type: &str) {
    counter!("videoflow_store_errors_total", "error_type" => error_type.to_string()).increment(1);
}

// -- Metadata resolver --

pub fn record_resolver_lookup_duration(seconds: f64) {
    histogram!("videoflow_resolver_lookup_duration_seconds").record(seconds);
}

pub fn inc_resolver_error(error_type: &str) {
    counter!("videoflow_resolver_errors_total", "error_type" => error_type.to_string())
        .increment(1);
}

// -- Storage service hop --

pub fn record_upstream_request_duration(seconds: f64) {
    histogram!("videoflow_upstream_request_duration_seconds").record(seconds);
}

pub fn inc_upstream_error(error_type: &str) {
    counter!("videoflow_upstream_errors_total", "error_type" => error_type.to_string())
        .increment(1);
}

// -- System --

pub fn set_uptime_seconds(seconds: f64) {
    gauge!("videoflow_uptime_seconds").set(seconds);
}

pub fn inc_panic_total() {
    counter!("videoflow_panic_total").increment(1);
}

pub fn set_shutdown_in_progress(in_progress: bool) {
    gauge!("videoflow_shutdown_in_progress").set(if in_progress { 1.0 } else { 0.0 });
}

// ---------------------------------------------------------------------------
// Status code bucket helper
// ---------------------------------------------------------------------------

/// Collapse a status code into its class label (`2xx`, `4xx`, ...).
pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

// ---------------------------------------------------------------------------
// Uptime tracking task
// ---------------------------------------------------------------------------

/// Update the uptime gauge every second until cancelled.
pub async fn run_uptime_task(start_time: Instant, cancel: tokio_util::sync::CancellationToken) {
    let interval = std::time::Duration::from_secs(1);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {
                set_uptime_seconds(start_time.elapsed().as_secs_f64());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Prometheus recorder installation
// ---------------------------------------------------------------------------

/// Install the Prometheus metrics recorder.
///
/// This sets up the global `metrics` recorder backed by `metrics-exporter-prometheus`.
/// Returns a handle that can render the metrics as Prometheus text exposition format.
pub fn install_prometheus_recorder(
) -> Result<metrics_exporter_prometheus::PrometheusHandle, metrics_exporter_prometheus::BuildError>
{
    metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()
}
