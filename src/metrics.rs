use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and return a router exposing `/metrics`
/// in the exposition format. Must be called once per process, before any
/// counters are incremented, so series register against the recorder.
pub fn init_metrics(cache_ttl_secs: u64) -> Router {
    // Default buckets; avoids API differences across crate versions.
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prometheus: install recorder");

    // Static gauge documenting the configured cache TTL.
    gauge!("announcement_cache_ttl_secs").set(cache_ttl_secs as f64);

    Router::new().route(
        "/metrics",
        get(move || {
            let h = handle.clone();
            async move { h.render() }
        }),
    )
}
