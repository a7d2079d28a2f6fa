//! Metrics module
//!
//! Prometheus counters and histograms for batch uploads.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

lazy_static! {
    // Batch metrics
    pub static ref BATCHES_TOTAL: CounterVec = register_counter_vec!(
        "batch_uploads_total",
        "Total number of upload batches by final state",
        &["status"]  // "completed", "aborted" or "cancelled"
    ).unwrap();

    // Per-file metrics
    pub static ref FILE_UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "batch_file_uploads_total",
        "Total number of file uploads",
        &["status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "batch_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref FILE_UPLOAD_DURATION: Histogram = register_histogram!(
        "batch_file_upload_duration_seconds",
        "Signed POST duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "batch_errors_total",
        "Total batch-aborting errors",
        &["type"]
    ).unwrap();
}

/// Record the final state of a batch
pub fn record_batch(status: &str) {
    BATCHES_TOTAL.with_label_values(&[status]).inc();
}

/// Record a successful file upload
pub fn record_file_upload_success(bytes: u64) {
    FILE_UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed file upload
pub fn record_file_upload_failure() {
    FILE_UPLOADS_TOTAL.with_label_values(&["failure"]).inc();
}

/// Record signed POST duration
pub fn record_file_upload_duration(duration_secs: f64) {
    FILE_UPLOAD_DURATION.observe(duration_secs);
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Encode every registered metric in the Prometheus text format
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
