//! Prometheus metrics for the import pipeline and scheduler
//!
//! This module provides metrics tracking for:
//! - Scheduler: cycles by outcome, lock ownership
//! - Pipeline: posts imported/skipped, fetch/paraphrase/media failures
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram, CounterVec, Encoder, Gauge,
    Histogram, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all pipeline metrics
struct PipelineMetrics {
    cycles: CounterVec,
    cycle_duration: Histogram,
    lock_held: Gauge,
    posts_imported: CounterVec,
    posts_skipped: CounterVec,
    fetch_failures: CounterVec,
    paraphrase_failures: CounterVec,
    media_failures: CounterVec,
}

/// Global storage for pipeline metrics
static PIPELINE_METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once. If metric registration fails, the error is
/// returned and subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = syndic::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = PipelineMetrics {
        cycles: register_counter_vec!(
            "syndic_cycles_total",
            "Scheduler cycles by outcome",
            &["outcome"]
        )?,
        cycle_duration: register_histogram!(
            "syndic_cycle_duration_seconds",
            "Time spent in a completed cycle in seconds",
            vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]
        )?,
        lock_held: register_gauge!(
            "syndic_lock_held",
            "Whether this process holds the run lock (1 = yes, 0 = no)"
        )?,
        posts_imported: register_counter_vec!(
            "syndic_posts_imported_total",
            "Posts imported per source",
            &["source"]
        )?,
        posts_skipped: register_counter_vec!(
            "syndic_posts_skipped_total",
            "Posts skipped per reason",
            &["reason"]
        )?,
        fetch_failures: register_counter_vec!(
            "syndic_fetch_failures_total",
            "Failed page fetches per source",
            &["source"]
        )?,
        paraphrase_failures: register_counter_vec!(
            "syndic_paraphrase_failures_total",
            "Failed paraphrase calls per field",
            &["field"]
        )?,
        media_failures: register_counter_vec!(
            "syndic_media_failures_total",
            "Failed media relocations per kind",
            &["kind"]
        )?,
    };

    PIPELINE_METRICS
        .set(metrics)
        .map_err(|_| "Pipeline metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    PIPELINE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a scheduler cycle outcome (`completed`, `paused`, `already_running`, `failed`)
pub fn record_cycle(outcome: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.cycles.with_label_values(&[outcome]).inc();
    }
}

/// Record the run lock being taken or released
pub fn set_lock_held(held: bool) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.lock_held.set(if held { 1.0 } else { 0.0 });
    }
}

/// Record an imported post
pub fn record_post_imported(source: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.posts_imported.with_label_values(&[source]).inc();
    }
}

/// Record skipped posts (`duplicate`, `invalid`, `rejected`)
pub fn record_posts_skipped(reason: &str, count: usize) {
    let Some(m) = PIPELINE_METRICS.get() else {
        return;
    };

    if count > 0 {
        m.posts_skipped
            .with_label_values(&[reason])
            .inc_by(count as f64);
    }
}

/// Record a failed page fetch
pub fn record_fetch_failure(source: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.fetch_failures.with_label_values(&[source]).inc();
    }
}

/// Record a failed paraphrase call
pub fn record_paraphrase_failure(field: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.paraphrase_failures.with_label_values(&[field]).inc();
    }
}

/// Record a failed media relocation
pub fn record_media_failure(kind: &str) {
    if let Some(m) = PIPELINE_METRICS.get() {
        m.media_failures.with_label_values(&[kind]).inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }

    /// Drop the measurement without recording it
    pub fn discard(mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_discard();
        }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a cycle timer
pub fn start_cycle_timer() -> MetricsTimer {
    match PIPELINE_METRICS.get() {
        Some(m) => MetricsTimer::new(m.cycle_duration.start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics() {
        assert!(init_metrics().is_ok());

        // Idempotent
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        record_cycle("completed");

        let text = encode_metrics().unwrap();
        assert!(text.contains("syndic_cycles_total"));
    }

    #[test]
    fn test_pipeline_recording() {
        ensure_metrics_initialized();
        assert!(metrics_initialized());

        set_lock_held(true);
        record_post_imported("https://donor.example/wp-json/wp/v2/posts");
        record_posts_skipped("duplicate", 3);
        record_posts_skipped("invalid", 0);
        record_fetch_failure("https://donor.example/wp-json/wp/v2/posts");
        record_paraphrase_failure("title");
        record_media_failure("image");
        set_lock_held(false);
    }

    #[test]
    fn test_cycle_timer() {
        ensure_metrics_initialized();
        let _timer = start_cycle_timer();
        start_cycle_timer().discard();
    }
}
