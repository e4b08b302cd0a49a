use axum::extract::State;
use axum::Json;

use crate::app_state::AppState;
use crate::error::AppResult;
use crate::models::api::PrintersResponse;
use crate::services::auth::Session;

/// GET /api/v1/printers: Printers the bridge can reach, plus the default.
pub async fn list_printers(
    State(state): State<AppState>,
    _session: Session,
) -> AppResult<Json<PrintersResponse>> {
    let bridge = state.bridge();
    let printers = bridge.discover().await?;
    let default = bridge.default_printer().await?.map(|d| d.name);

    Ok(Json(PrintersResponse {
        backend: bridge.backend().to_string(),
        printers,
        default,
    }))
}
