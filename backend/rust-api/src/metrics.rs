use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Attempt source
    pub static ref ATTEMPT_FETCH_DURATION_SECONDS: Histogram = register_histogram!(
        "attempt_fetch_duration_seconds",
        "Time spent reading a learner's attempt history",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // Engine Metrics
    pub static ref METRIC_COMPUTATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "metric_computations_total",
        "Total number of learner metric computations",
        &["metric", "status"]
    )
    .unwrap();

    pub static ref ATTEMPTS_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempts_dropped_total",
        "Malformed drill attempts excluded from aggregation",
        &["reason"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

pub fn record_computation(metric: &str, status: &str) {
    METRIC_COMPUTATIONS_TOTAL
        .with_label_values(&[metric, status])
        .inc();
}

pub fn record_dropped_attempt(reason: &str) {
    ATTEMPTS_DROPPED_TOTAL.with_label_values(&[reason]).inc();
}
