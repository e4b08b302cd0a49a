use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};

use crate::services::auth::AuthError;
use crate::services::print_jobs::PrintJobError;
use crate::services::printer::BridgeError;
use crate::services::store::StoreError;

/// Application-level error type for HTTP handlers.
///
/// Every variant renders as `{ "error": ..., "code": ..., "details"?: ... }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    /// Field-level validation failures, reported in `details`.
    #[error("{message}")]
    InvalidFields { message: String, details: Value },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    PrintJob(#[from] PrintJobError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        let details: Vec<Value> = report
            .iter()
            .map(|(path, error)| json!({ "field": path.to_string(), "message": error.message() }))
            .collect();
        AppError::InvalidFields {
            message: "Request validation failed".to_string(),
            details: Value::Array(details),
        }
    }
}

fn store_failure(err: &StoreError) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "Persistence failure");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "PERSISTENCE_FAILURE",
        "A storage error occurred".to_string(),
    )
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(msg) | AppError::InvalidFields { message: msg, .. } => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Auth(err) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", err.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),

            AppError::PrintJob(err) => match err {
                PrintJobError::NotFound(_) | PrintJobError::LabelNotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
                }
                PrintJobError::RetriesExhausted { .. } => {
                    (StatusCode::CONFLICT, "RETRIES_EXHAUSTED", err.to_string())
                }
                PrintJobError::AlreadySucceeded
                | PrintJobError::AlreadyProcessing
                | PrintJobError::NotFailed
                | PrintJobError::AlreadyAttempted => {
                    (StatusCode::CONFLICT, "INVALID_TRANSITION", err.to_string())
                }
                PrintJobError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", err.to_string()),
                PrintJobError::Store(e) => store_failure(e),
            },

            AppError::Bridge(err) => match err {
                BridgeError::Unavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, err.code(), err.to_string())
                }
                BridgeError::UnknownPrinter(_) | BridgeError::NoDefaultPrinter => {
                    (StatusCode::NOT_FOUND, err.code(), err.to_string())
                }
                BridgeError::Transmission(_) | BridgeError::InvalidConfig(_) => {
                    (StatusCode::BAD_GATEWAY, err.code(), err.to_string())
                }
            },

            AppError::Store(err) => store_failure(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = match self {
            AppError::InvalidFields { details, .. } => json!({
                "error": message,
                "code": code,
                "details": details,
            }),
            _ => json!({
                "error": message,
                "code": code,
            }),
        };

        (status, axum::Json(body)).into_response()
    }
}
