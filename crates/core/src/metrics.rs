//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Job admission and outcomes
//! - Queue depth and concurrency
//! - Encoder runs (duration, output size)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Jobs
// =============================================================================

/// Jobs accepted by submit or retry.
pub static JOBS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidqueue_jobs_submitted_total", "Total jobs accepted"),
        &["origin"], // "submit", "retry"
    )
    .unwrap()
});

/// Submissions rejected during validation.
pub static JOBS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidqueue_jobs_rejected_total", "Total rejected submissions"),
        &["reason"], // "input_not_found", "destination_exists", ...
    )
    .unwrap()
});

/// Jobs that reached a terminal status.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidqueue_jobs_finished_total", "Total jobs finished"),
        &["status"], // "completed", "failed", "cancelled"
    )
    .unwrap()
});

/// Failures by error code.
pub static JOB_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidqueue_job_failures_total", "Total job failures by code"),
        &["code"],
    )
    .unwrap()
});

// =============================================================================
// Queue
// =============================================================================

pub static JOBS_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("vidqueue_jobs_queued", "Jobs waiting for a slot").unwrap()
});

pub static JOBS_PROCESSING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("vidqueue_jobs_processing", "Encoder processes running").unwrap()
});

pub static CONCURRENCY_LIMIT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("vidqueue_concurrency_limit", "Current concurrency limit").unwrap()
});

/// Records removed by the retention sweep.
pub static JOBS_SWEPT: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("vidqueue_jobs_swept_total", "Total job records swept").unwrap()
});

// =============================================================================
// Encoder
// =============================================================================

/// Wall-clock encoder run time.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vidqueue_conversion_duration_seconds",
            "Duration of encoder runs",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]),
        &["status"],
    )
    .unwrap()
});

pub static OUTPUT_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidqueue_output_bytes_total",
        "Total bytes written by completed conversions",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Jobs
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(JOBS_REJECTED.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOB_FAILURES.clone()),
        // Queue
        Box::new(JOBS_QUEUED.clone()),
        Box::new(JOBS_PROCESSING.clone()),
        Box::new(CONCURRENCY_LIMIT.clone()),
        Box::new(JOBS_SWEPT.clone()),
        // Encoder
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(OUTPUT_BYTES.clone()),
    ]
}
