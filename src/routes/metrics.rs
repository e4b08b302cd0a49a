use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and describe application metrics.
/// Call once per process.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!(
        "labels_ingested_total",
        "Uploaded label records by outcome (new, duplicate, failed)"
    );
    metrics::describe_counter!("print_jobs_created_total", "Print jobs created");
    metrics::describe_counter!(
        "print_attempts_total",
        "Print transmissions by outcome (success, failed)"
    );
    metrics::describe_counter!("print_retries_total", "Retries of failed print jobs");
    metrics::describe_counter!(
        "print_retries_exhausted_total",
        "Retry requests refused because the job's budget was spent"
    );
    metrics::describe_counter!(
        "audit_write_failures_total",
        "Audit rows that could not be written"
    );

    Ok(handle)
}

/// Prometheus metrics scrape endpoint.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
