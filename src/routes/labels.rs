use axum::extract::{Path, Query, State};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use garde::Validate;
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::models::api::{BatchRequest, LabelFilter, PrintRequest, PrintResponse, QrCodesResponse};
use crate::models::audit::AuditAction;
use crate::models::label::Label;
use crate::services::audit::RequestOrigin;
use crate::services::auth::Session;
use crate::services::ingest::{ingest, BatchResult};
use crate::services::qr::render_pair;

/// POST /api/v1/labels/batch: Classify and store a batch of label records.
pub async fn ingest_batch(
    State(state): State<AppState>,
    session: Session,
    origin: RequestOrigin,
    Json(request): Json<BatchRequest>,
) -> AppResult<Json<BatchResult>> {
    if request.labels.is_empty() {
        return Err(AppError::Validation("No labels provided".to_string()));
    }
    if request.labels.len() > state.config.max_batch_size {
        return Err(AppError::Validation(format!(
            "Batch of {} labels exceeds the limit of {}",
            request.labels.len(),
            state.config.max_batch_size
        )));
    }

    let result = ingest(state.labels.as_ref(), request.labels, &session).await;

    state
        .audit
        .record(
            &session,
            &origin,
            AuditAction::ProcessBatch,
            None,
            json!({
                "total_processed": result.total_processed,
                "new_count": result.new_count,
                "duplicate_count": result.duplicate_count,
                "failed_count": result.failed_count,
            }),
        )
        .await;

    Ok(Json(result))
}

/// GET /api/v1/labels: List labels, newest first.
pub async fn list_labels(
    State(state): State<AppState>,
    _session: Session,
    Query(filter): Query<LabelFilter>,
) -> AppResult<Json<Vec<Label>>> {
    filter.validate()?;
    Ok(Json(state.labels.list(&filter).await?))
}

/// GET /api/v1/labels/{id}
pub async fn get_label(
    State(state): State<AppState>,
    _session: Session,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Label>> {
    let label = state
        .labels
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("label {id} not found")))?;
    Ok(Json(label))
}

/// GET /api/v1/labels/{id}/qr: Both identity payloads, rendered.
pub async fn label_qr_codes(
    State(state): State<AppState>,
    _session: Session,
    Path(id): Path<Uuid>,
) -> AppResult<Json<QrCodesResponse>> {
    let label = state
        .labels
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("label {id} not found")))?;

    let (traceability_url, attribute_record) = state.encoder.encode(&label);
    let (upper, lower) = render_pair(state.renderer.as_ref(), &traceability_url, &attribute_record);

    let mut errors = Vec::new();
    let traceability_png = upper
        .map(|bytes| BASE64.encode(bytes))
        .map_err(|e| errors.push(format!("traceability code: {e}")))
        .ok();
    let attribute_png = lower
        .map(|bytes| BASE64.encode(bytes))
        .map_err(|e| errors.push(format!("attribute code: {e}")))
        .ok();

    Ok(Json(QrCodesResponse {
        label_id: label.id,
        traceability_url,
        attribute_record,
        traceability_png,
        attribute_png,
        errors,
    }))
}

/// POST /api/v1/labels/print: Create a print job and send it once.
///
/// A failed send still answers 200: the job exists, is `failed`, and can be
/// retried. The failure is reported in `error_code` / `error_message`.
pub async fn print_label(
    State(state): State<AppState>,
    session: Session,
    origin: RequestOrigin,
    Json(request): Json<PrintRequest>,
) -> AppResult<Json<PrintResponse>> {
    request.validate()?;

    let attempt = state
        .printing
        .print_label(&session, request.id, request.printer.as_deref())
        .await?;

    state
        .audit
        .record(
            &session,
            &origin,
            AuditAction::PrintLabel,
            Some(request.id.to_string()),
            json!({
                "print_job_id": attempt.job.id,
                "status": attempt.job.status,
                "printer": attempt.job.printer,
            }),
        )
        .await;

    let message = if attempt.succeeded() {
        "Label sent to printer"
    } else {
        "Print job created but printing failed"
    };

    Ok(Json(PrintResponse {
        message: message.to_string(),
        print_job_id: attempt.job.id,
        status: attempt.job.status.to_string(),
        error_code: attempt.error.as_ref().map(|e| e.code().to_string()),
        error_message: attempt.job.error_message.clone(),
        zpl_content: attempt.job.zpl_content,
    }))
}
