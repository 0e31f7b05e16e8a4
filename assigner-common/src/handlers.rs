use axum::{http::StatusCode, routing, Router};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::metrics;

/// Routes served by every assigner process.
///
/// `/health` and `/ready` always answer 200: they tell the orchestrator the
/// process is up, not that its loop is making progress.
pub fn app(name: &'static str, metrics: Option<PrometheusHandle>) -> Router {
    Router::new()
        .route("/", routing::get(move || std::future::ready(name)))
        .route("/health", routing::get(health))
        .route("/ready", routing::get(ready))
        .route(
            "/metrics",
            routing::get(move || match metrics {
                Some(ref recorder_handle) => std::future::ready(recorder_handle.render()),
                None => std::future::ready("no metrics recorder installed".to_owned()),
            }),
        )
        .layer(axum::middleware::from_fn(metrics::track_metrics))
}

pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "Healthy!")
}

pub async fn ready() -> (StatusCode, &'static str) {
    (StatusCode::OK, "Ready!")
}
