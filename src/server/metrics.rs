use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Every metric name starts with this.
const PREFIX: &str = "scarica";

fn name(metric: &str) -> String {
    format!("{PREFIX}_{metric}")
}

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(name("http_requests_total"), "HTTP requests served"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            name("http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        // File serving sits in the long tail, so the buckets stretch far.
        .buckets(vec![0.005, 0.05, 0.25, 1.0, 5.0, 30.0, 120.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    pub static ref JOBS_SUBMITTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(name("jobs_submitted_total"), "Download jobs submitted"),
        &["format"]
    ).expect("Failed to create jobs_submitted_total metric");

    pub static ref JOBS_FINISHED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(name("jobs_finished_total"), "Download jobs that reached a terminal status"),
        &["status"]
    ).expect("Failed to create jobs_finished_total metric");

    pub static ref STRATEGY_ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(name("strategy_attempts_total"), "Download strategy attempts by outcome"),
        &["strategy", "outcome"]
    ).expect("Failed to create strategy_attempts_total metric");

    pub static ref ACTIVE_DOWNLOADS: IntGauge = IntGauge::new(
        name("active_downloads"),
        "Download pipelines currently running"
    ).expect("Failed to create active_downloads metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        name("process_memory_bytes"),
        "Resident memory of this process in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Register every metric with the global registry.
pub fn init_metrics() {
    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(JOBS_SUBMITTED_TOTAL.clone()),
        Box::new(JOBS_FINISHED_TOTAL.clone()),
        Box::new(STRATEGY_ATTEMPTS_TOTAL.clone()),
        Box::new(ACTIVE_DOWNLOADS.clone()),
        Box::new(PROCESS_MEMORY_BYTES.clone()),
    ];
    for collector in collectors {
        // Tests call this more than once, re-registration errors are fine.
        let _ = REGISTRY.register(collector);
    }

    tracing::info!("Metrics system initialized");
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_job_submitted(format: &str) {
    JOBS_SUBMITTED_TOTAL.with_label_values(&[format]).inc();
}

/// Count a job reaching a terminal status ("completed" or "failed").
pub fn record_job_finished(status: &str) {
    JOBS_FINISHED_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_strategy_attempt(strategy: &str, outcome: &str) {
    STRATEGY_ATTEMPTS_TOTAL
        .with_label_values(&[strategy, outcome])
        .inc();
}

/// Count a running pipeline for the active-downloads gauge until the
/// returned guard is dropped.
pub fn track_active_download() -> ActiveDownload {
    ACTIVE_DOWNLOADS.inc();
    ActiveDownload { _private: () }
}

pub struct ActiveDownload {
    _private: (),
}

impl Drop for ActiveDownload {
    fn drop(&mut self) {
        ACTIVE_DOWNLOADS.dec();
    }
}

fn resident_memory_bytes() -> Option<f64> {
    // Linux only. Elsewhere the read fails and the gauge stays at zero.
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let vm_rss = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kb: f64 = vm_rss.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024.0)
}

pub fn update_memory_usage() {
    if let Some(bytes) = resident_memory_bytes() {
        PROCESS_MEMORY_BYTES.set(bytes);
    }
}

/// Handler for the /metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(err) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", err);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", err),
        );
    }

    (
        StatusCode::OK,
        String::from_utf8(buffer).unwrap_or_default(),
    )
}
