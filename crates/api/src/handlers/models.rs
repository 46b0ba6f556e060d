//! Handlers for the scoring model registry and training.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use leadq_core::error::CoreError;
use leadq_core::types::DbId;
use leadq_db::repositories::ScoringModelRepo;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST .../models/train`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct TrainRequest {
    /// Promote the new version immediately (default `true`).
    pub activate: Option<bool>,
}

/// GET /api/v1/orgs/{org_id}/models
pub async fn list(
    State(state): State<AppState>,
    Path(org_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let models = ScoringModelRepo::list(&state.pool, org_id).await?;
    Ok(Json(DataResponse { data: models }))
}

/// GET /api/v1/orgs/{org_id}/models/active
///
/// `data` is `null` while the organization has no active model.
pub async fn active(
    State(state): State<AppState>,
    Path(org_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let model = ScoringModelRepo::find_active(&state.pool, org_id).await?;
    Ok(Json(DataResponse { data: model }))
}

/// GET /api/v1/orgs/{org_id}/models/status
pub async fn status(
    State(state): State<AppState>,
    Path(org_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let status = state.training.status(org_id).await?;
    Ok(Json(DataResponse { data: status }))
}

/// POST /api/v1/orgs/{org_id}/models/train
///
/// Runs training to completion and returns the new version.
pub async fn train(
    State(state): State<AppState>,
    Path(org_id): Path<DbId>,
    body: Option<Json<TrainRequest>>,
) -> AppResult<impl IntoResponse> {
    let activate = body.and_then(|Json(b)| b.activate).unwrap_or(true);
    let model = state.training.train(org_id, activate).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: model })))
}

/// DELETE /api/v1/orgs/{org_id}/models/training
pub async fn cancel_training(
    State(state): State<AppState>,
    Path(org_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    if state.training.cancel(org_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Core(CoreError::Conflict(
            "No training run is in progress".into(),
        )))
    }
}

/// POST /api/v1/orgs/{org_id}/models/{version}/activate
pub async fn activate(
    State(state): State<AppState>,
    Path((org_id, version)): Path<(DbId, i32)>,
) -> AppResult<impl IntoResponse> {
    let model = state.training.activate(org_id, version).await?;
    Ok(Json(DataResponse { data: model }))
}
