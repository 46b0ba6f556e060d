use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use leadq_core::error::{CoreError, ModelError, ScoringError};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain error enums and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `leadq_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Invalid criteria or scoring settings for the organization.
    #[error(transparent)]
    Scoring(#[from] ScoringError),

    /// Training or model lifecycle failure.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            // --- Scoring configuration ---
            AppError::Scoring(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "CONFIGURATION_ERROR",
                err.to_string(),
            ),

            // --- Model lifecycle ---
            AppError::Model(err) => match err {
                ModelError::InsufficientData { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "INSUFFICIENT_DATA",
                    err.to_string(),
                ),
                ModelError::TrainingInProgress(_) => (
                    StatusCode::CONFLICT,
                    "TRAINING_IN_PROGRESS",
                    err.to_string(),
                ),
                ModelError::InvalidTransition { .. } => (
                    StatusCode::CONFLICT,
                    "INVALID_MODEL_TRANSITION",
                    err.to_string(),
                ),
                ModelError::Cancelled => {
                    (StatusCode::CONFLICT, "TRAINING_CANCELLED", err.to_string())
                }
                ModelError::NonFinite => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "TRAINING_FAILED",
                    err.to_string(),
                ),
                ModelError::FeatureShapeMismatch(_) => {
                    tracing::error!(error = %err, "Model feature schema mismatch");
                    internal()
                }
            },

            // --- Database errors ---
            AppError::Database(err) => classify_sqlx_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}
