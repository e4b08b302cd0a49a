use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod audit;
pub mod health;
pub mod labels;
pub mod metrics;
pub mod print_jobs;
pub mod printers;

/// Upload batches are JSON; 10 MB holds several thousand records.
const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// Build the full HTTP router. `/metrics` is mounted only when a recorder
/// handle is supplied.
pub fn build_router(state: AppState, prometheus: Option<Arc<PrometheusHandle>>) -> Router {
    let api = Router::new()
        .route("/labels", get(labels::list_labels))
        .route("/labels/batch", post(labels::ingest_batch))
        .route("/labels/print", post(labels::print_label))
        .route("/labels/{id}", get(labels::get_label))
        .route("/labels/{id}/qr", get(labels::label_qr_codes))
        .route("/print-jobs", get(print_jobs::list_print_jobs))
        .route("/print-jobs/retry", post(print_jobs::retry_print_job))
        .route("/print-jobs/{id}", get(print_jobs::get_print_job))
        .route("/printers", get(printers::list_printers))
        .route("/audit-logs", get(audit::list_audit_logs));

    let mut app = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api)
        .with_state(state);

    if let Some(handle) = prometheus {
        app = app.route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(handle),
        );
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
}
