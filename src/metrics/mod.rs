//! Metrics module
//!
//! Prometheus counters and histograms for the upload pipeline.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "presign_uploads_total",
        "Files that reached a terminal state",
        &["status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "presign_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref PHASE_DURATION: HistogramVec = register_histogram_vec!(
        "presign_phase_duration_seconds",
        "Duration of grant requests and storage PUTs in seconds",
        &["phase"],  // "grant" or "transfer"
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).unwrap();

    // Rejection metrics
    pub static ref VALIDATION_FAILURES: CounterVec = register_counter_vec!(
        "presign_validation_failures_total",
        "Files rejected by client-side validation",
        &["check"]
    ).unwrap();

    pub static ref ADMISSION_REJECTIONS: Counter = register_counter!(
        "presign_admission_rejections_total",
        "Files skipped because the upload rate limit was reached"
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "presign_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a successful upload
pub fn record_upload_success(bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure() {
    UPLOADS_TOTAL.with_label_values(&["error"]).inc();
}

/// Record the duration of a pipeline phase
pub fn record_phase_duration(phase: &str, duration_secs: f64) {
    PHASE_DURATION
        .with_label_values(&[phase])
        .observe(duration_secs);
}

/// Record a validation rejection for the failing check
pub fn record_validation_failure(check: &str) {
    VALIDATION_FAILURES.with_label_values(&[check]).inc();
}

pub fn record_admission_rejection() {
    ADMISSION_REJECTIONS.inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
