use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Process-local Prometheus recorder, for host apps that want to scrape the
/// SDK's own counters locally. Grounded on
/// `hook-common::metrics::setup_metrics_recorder`; unlike the teacher's
/// services this SDK has no HTTP surface to serve the rendered text on, so
/// callers decide how to expose `PrometheusHandle::render()` themselves
/// (typically over whatever debug channel the host bridge already has).
pub fn setup_metrics_recorder() -> PrometheusHandle {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)
        .expect("valid histogram buckets")
        .install_recorder()
        .expect("install the global metrics recorder exactly once per process")
}
