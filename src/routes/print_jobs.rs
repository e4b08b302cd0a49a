use axum::extract::{Path, Query, State};
use axum::Json;
use garde::Validate;
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::AppResult;
use crate::models::api::{PageParams, PrintJobView, RetryRequest};
use crate::models::audit::AuditAction;
use crate::services::audit::RequestOrigin;
use crate::services::auth::Session;

/// GET /api/v1/print-jobs: The session's jobs (all jobs for admins).
pub async fn list_print_jobs(
    State(state): State<AppState>,
    session: Session,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Vec<PrintJobView>>> {
    page.validate()?;

    let jobs = state
        .printing
        .list_jobs(&session, page.limit(), page.offset())
        .await?;
    Ok(Json(jobs.into_iter().map(PrintJobView::from).collect()))
}

/// GET /api/v1/print-jobs/{id}
pub async fn get_print_job(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PrintJobView>> {
    let job = state.printing.get_job(&session, id).await?;
    Ok(Json(job.into()))
}

/// POST /api/v1/print-jobs/retry: Resend a failed job's document.
///
/// An exhausted job answers 409 `RETRIES_EXHAUSTED` and is left untouched.
/// A retry whose send fails again answers 200 with the failed job.
pub async fn retry_print_job(
    State(state): State<AppState>,
    session: Session,
    origin: RequestOrigin,
    Json(request): Json<RetryRequest>,
) -> AppResult<Json<PrintJobView>> {
    request.validate()?;

    let attempt = state
        .printing
        .retry(&session, request.job_id, request.printer.as_deref())
        .await?;

    state
        .audit
        .record(
            &session,
            &origin,
            AuditAction::RetryPrintJob,
            Some(request.job_id.to_string()),
            json!({
                "retry_count": attempt.job.retry_count,
                "max_retries": attempt.job.max_retries,
                "status": attempt.job.status,
            }),
        )
        .await;

    let error_code = attempt.error.as_ref().map(|e| e.code().to_string());
    let message = if attempt.succeeded() {
        "Print job retried successfully".to_string()
    } else if attempt.job.is_exhausted() {
        "Retry failed; no retries left".to_string()
    } else {
        format!(
            "Retry failed ({}/{} retries used)",
            attempt.job.retry_count, attempt.job.max_retries
        )
    };

    let mut view = PrintJobView::from(attempt.job);
    view.message = Some(message);
    view.error_code = error_code;
    Ok(Json(view))
}
