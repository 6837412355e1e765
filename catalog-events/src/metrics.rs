use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const PRODUCED_COUNTER: &str = "catalog_events_produced_total";
pub const PRODUCE_ERRORS_COUNTER: &str = "catalog_events_produce_errors_total";
pub const DROPPED_COUNTER: &str = "catalog_events_dropped_total";
pub const CONSUMED_COUNTER: &str = "catalog_events_consumed_total";
pub const COMMIT_ERRORS_COUNTER: &str = "catalog_events_commit_errors_total";

/// Counters for the event pipeline. Injected into the pool and consumers
/// so tests can count without a global recorder.
pub trait MetricsSink: Send + Sync {
    fn produced(&self);
    fn produce_error(&self);
    fn dropped(&self);

    fn consumed(&self, _topic: &str) {}

    fn commit_error(&self, _topic: &str) {}
}

/// Forwards to whatever `metrics` recorder is installed in the process.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrometheusSink;

impl MetricsSink for PrometheusSink {
    fn produced(&self) {
        metrics::counter!(PRODUCED_COUNTER).increment(1);
    }

    fn produce_error(&self) {
        metrics::counter!(PRODUCE_ERRORS_COUNTER).increment(1);
    }

    fn dropped(&self) {
        metrics::counter!(DROPPED_COUNTER).increment(1);
    }

    fn consumed(&self, topic: &str) {
        metrics::counter!(CONSUMED_COUNTER, "topic" => topic.to_owned()).increment(1);
    }

    fn commit_error(&self, topic: &str) {
        metrics::counter!(COMMIT_ERRORS_COUNTER, "topic" => topic.to_owned()).increment(1);
    }
}

pub fn setup_metrics_recorder(
) -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn metrics_router(recorder_handle: Option<PrometheusHandle>) -> Router {
    let router = Router::new()
        .route("/", get(|| async { "catalog events" }))
        .route("/_liveness", get(|| async { "ok" }));

    match recorder_handle {
        Some(handle) => {
            router.route("/metrics", get(move || std::future::ready(handle.render())))
        }
        None => router,
    }
}

/// Bind a `TcpListener` on the provided bind address to serve a `Router` on it.
pub async fn serve(router: Router, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router).await?;

    Ok(())
}
