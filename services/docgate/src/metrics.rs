//! Prometheus metrics exposition
//!
//! The binary records per-request metrics; the library crates emit their own
//! counters through the same global recorder:
//!
//! - `docgate_conversions_total` (counter): labels `tool`, `outcome`
//! - `docgate_conversion_duration_seconds` (histogram): label `tool`
//! - `docgate_jobs_total`, `docgate_fallbacks_total`,
//!   `docgate_credential_rotations_total` (from the core crates)

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "docgate_conversion_duration_seconds";

/// Conversions poll remote jobs for minutes, so buckets run from 50ms to 10m.
const DURATION_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// The duration metric gets explicit buckets so it renders as a histogram
/// (with `_bucket` lines) rather than the default summary.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a finished conversion request.
pub fn record_conversion(tool: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "docgate_conversions_total",
        "tool" => tool.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!(DURATION_METRIC, "tool" => tool.to_string()).record(duration_secs);
}
