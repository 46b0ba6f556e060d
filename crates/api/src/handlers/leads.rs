//! Handlers for lead qualification and outcomes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use leadq_core::error::CoreError;
use leadq_core::types::DbId;
use leadq_db::models::outcome::CreateOutcome;
use leadq_db::repositories::{LeadRepo, OutcomeRepo, QualificationRepo};

use crate::error::{AppError, AppResult};
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/orgs/{org_id}/leads/{lead_id}/qualify
///
/// Score the lead and return the persisted result.
pub async fn qualify(
    State(state): State<AppState>,
    Path((org_id, lead_id)): Path<(DbId, DbId)>,
) -> AppResult<impl IntoResponse> {
    let result = state.qualifier.qualify(org_id, lead_id).await?;
    Ok(Json(DataResponse { data: result }))
}

/// GET /api/v1/orgs/{org_id}/leads/{lead_id}/qualifications?limit=&offset=
///
/// Qualification history, newest first.
pub async fn list_qualifications(
    State(state): State<AppState>,
    Path((org_id, lead_id)): Path<(DbId, DbId)>,
    Query(params): Query<PaginationParams>,
) -> AppResult<impl IntoResponse> {
    ensure_lead(&state, org_id, lead_id).await?;
    let rows = QualificationRepo::list_for_lead(
        &state.pool,
        org_id,
        lead_id,
        params.limit(),
        params.offset(),
    )
    .await?;
    Ok(Json(DataResponse { data: rows }))
}

/// POST /api/v1/orgs/{org_id}/leads/{lead_id}/outcomes
///
/// Append a terminal outcome. May start the organization's first training
/// run in the background.
pub async fn record_outcome(
    State(state): State<AppState>,
    Path((org_id, lead_id)): Path<(DbId, DbId)>,
    Json(input): Json<CreateOutcome>,
) -> AppResult<impl IntoResponse> {
    ensure_lead(&state, org_id, lead_id).await?;
    let outcome = OutcomeRepo::create(&state.pool, org_id, lead_id, &input).await?;
    tracing::info!(
        organization_id = org_id,
        lead_id,
        outcome = %input.outcome,
        "Outcome recorded"
    );

    if let Err(e) = state.training.maybe_start_initial(org_id).await {
        tracing::warn!(organization_id = org_id, error = %e, "Initial training check failed");
    }

    Ok((StatusCode::CREATED, Json(DataResponse { data: outcome })))
}

async fn ensure_lead(state: &AppState, org_id: DbId, lead_id: DbId) -> AppResult<()> {
    LeadRepo::find_by_id(&state.pool, org_id, lead_id)
        .await?
        .map(|_| ())
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Lead",
            id: lead_id,
        }))
}
