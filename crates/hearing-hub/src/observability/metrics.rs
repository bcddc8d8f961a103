//! Metrics definitions for Hearing Hub.
//!
//! All metrics follow Prometheus naming conventions:
//! - `hh_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `event_type`: the fixed set of callback event types plus "unknown"
//! - `outcome`: applied, dropped, ignored, error (callbacks); hit, loaded,
//!   not_found, error (cache)
//! - `kind`: internal event kinds (4 values)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Callback handling includes a possible Video API load on first reference
        .set_buckets_for_metric(
            Matcher::Prefix("hh_callback".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500,
            ],
        )
        .map_err(|e| format!("Failed to set callback buckets: {e}"))?
        // Cache loads are a single downstream HTTP call
        .set_buckets_for_metric(
            Matcher::Prefix("hh_cache_load".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set cache load buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Callback Metrics
// ============================================================================

/// Record a processed callback event.
///
/// Metric: `hh_callback_events_total`, `hh_callback_duration_seconds`
/// Labels: `event_type`, `outcome`
pub fn record_callback_event(event_type: &str, outcome: &str, duration: Duration) {
    histogram!("hh_callback_duration_seconds",
        "event_type" => event_type.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("hh_callback_events_total",
        "event_type" => event_type.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record an event rejected by the ordering guard.
///
/// Metric: `hh_guard_rejections_total`
/// Labels: `reason` (order_violation, invalid_transfer, not_found)
pub fn record_guard_rejection(reason: &'static str) {
    counter!("hh_guard_rejections_total", "reason" => reason).increment(1);
}

// ============================================================================
// Cache Metrics
// ============================================================================

/// Record a cache load from the Video API.
///
/// Metric: `hh_cache_loads_total`, `hh_cache_load_duration_seconds`
/// Labels: `outcome`
pub fn record_cache_load(outcome: &'static str, duration: Duration) {
    histogram!("hh_cache_load_duration_seconds").record(duration.as_secs_f64());
    counter!("hh_cache_loads_total", "outcome" => outcome).increment(1);
}

/// Record a cache lookup.
///
/// Metric: `hh_cache_lookups_total`
/// Labels: `result` (hit, miss)
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("hh_cache_lookups_total", "result" => result).increment(1);
}

/// Set the number of cached conferences.
///
/// Metric: `hh_cached_conferences`
pub fn set_cached_conferences(count: usize) {
    gauge!("hh_cached_conferences").set(count as f64);
}

// ============================================================================
// Hub Metrics
// ============================================================================

/// Set the number of live hub connections.
///
/// Metric: `hh_hub_connections`
pub fn set_hub_connections(count: usize) {
    gauge!("hh_hub_connections").set(count as f64);
}

/// Record the result of one publish.
///
/// Metric: `hh_hub_deliveries_total`
/// Labels: `result` (delivered, dropped)
pub fn record_hub_delivery(delivered: usize, dropped: usize) {
    if delivered > 0 {
        counter!("hh_hub_deliveries_total", "result" => "delivered").increment(delivered as u64);
    }
    if dropped > 0 {
        counter!("hh_hub_deliveries_total", "result" => "dropped").increment(dropped as u64);
    }
}

// ============================================================================
// Internal Event Metrics
// ============================================================================

/// Record a handled internal event.
///
/// Metric: `hh_internal_events_total`
/// Labels: `kind`, `outcome` (handled, unhandled, error)
pub fn record_internal_event(kind: &'static str, outcome: &'static str) {
    counter!("hh_internal_events_total",
        "kind" => kind,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a daily cache refresh run.
///
/// Metric: `hh_cache_refresh_runs_total`, `hh_cache_refresh_evicted_total`
pub fn record_cache_refresh(evicted: usize, refreshed: usize, failed: usize) {
    counter!("hh_cache_refresh_runs_total").increment(1);
    counter!("hh_cache_refresh_evicted_total").increment(evicted as u64);
    counter!("hh_cache_refresh_refreshed_total").increment(refreshed as u64);
    counter!("hh_cache_refresh_failed_total").increment(failed as u64);
}
