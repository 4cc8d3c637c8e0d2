//! Prometheus metrics exposition
//!
//! - `auth_logins_started_total` (counter)
//! - `auth_exchanges_total` (counter): label `outcome` (success, failure,
//!   cancelled, rejected)
//! - `auth_exchange_duration_seconds` (histogram): label `outcome`

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Configures `auth_exchange_duration_seconds` with explicit histogram
/// buckets so it renders `_bucket` lines for `histogram_quantile()` queries
/// rather than the default summary. The exchange involves two sequential
/// upstream round trips, so the buckets reach 30s.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "auth_exchange_duration_seconds".to_string(),
            ),
            &[0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a login attempt leaving for the authorization endpoint.
pub fn record_login_started() {
    metrics::counter!("auth_logins_started_total").increment(1);
}

/// Record a completed callback exchange with its outcome label.
pub fn record_exchange(outcome: &str, duration_secs: f64) {
    metrics::counter!("auth_exchanges_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("auth_exchange_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}
