//! Prometheus metrics setup
//!
//! Metric names follow the checker_* convention:
//! - checker_lookups_total{kind, outcome}: lookup attempts by result
//! - checker_batch_duration_seconds{kind}: end-to-end batch latency
//! - pool_exhausted_total: selection attempts that found no account
//! - pool_flood_waits_total: flood waits reported by the bridge

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Batches run for seconds to minutes, so the default millisecond-centric
/// buckets would put every sample in +Inf.
const BATCH_DURATION_BUCKETS: &[f64] = &[
    0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("checker_batch_duration_seconds".to_string()),
        BATCH_DURATION_BUCKETS,
    )
}

/// Install the global recorder and return the handle used by GET /metrics.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}
