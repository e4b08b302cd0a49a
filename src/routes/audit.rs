use axum::extract::{Query, State};
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::error::AppResult;
use crate::models::audit::{AuditLogsResponse, AuditQuery};
use crate::services::auth::Session;

/// GET /api/v1/audit-logs: The session's audit rows (any user's for admins).
pub async fn list_audit_logs(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<AuditLogsResponse>> {
    query.validate()?;

    let audit_logs = state.audit.list(&session, &query).await?;
    Ok(Json(AuditLogsResponse {
        count: audit_logs.len(),
        audit_logs,
    }))
}
