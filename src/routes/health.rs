use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: ComponentHealth,
    pub printer: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn ok(start: std::time::Instant) -> Self {
        Self {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            status: "error".to_string(),
            latency_ms: None,
            error: Some(message),
        }
    }
}

/// GET /health: Dependency status.
///
/// Only the store decides the status code. An unreachable printer degrades
/// the report but the service still ingests and queues print jobs.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let db_check = match state.labels.ping().await {
        Ok(_) => ComponentHealth::ok(start),
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            ComponentHealth::error("unreachable".to_string())
        }
    };

    let printer_start = std::time::Instant::now();
    let printer_check = match state.bridge().check().await {
        Ok(_) => ComponentHealth::ok(printer_start),
        Err(e) => ComponentHealth::error(e.to_string()),
    };

    let db_healthy = db_check.status == "ok";
    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let status = match (db_healthy, printer_check.status == "ok") {
        (true, true) => "ok",
        (true, false) => "degraded",
        (false, _) => "unavailable",
    };

    let response = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            database: db_check,
            printer: printer_check,
        },
    };

    (status_code, Json(response))
}
