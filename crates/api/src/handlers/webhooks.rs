//! Handlers for webhook delivery logs and replay.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use leadq_core::error::CoreError;
use leadq_core::types::DbId;
use leadq_db::repositories::WebhookRepo;

use crate::error::{AppError, AppResult};
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/orgs/{org_id}/webhooks/{id}/deliveries?limit=&offset=
pub async fn list_deliveries(
    State(state): State<AppState>,
    Path((org_id, webhook_id)): Path<(DbId, DbId)>,
    Query(params): Query<PaginationParams>,
) -> AppResult<impl IntoResponse> {
    WebhookRepo::find_by_id(&state.pool, org_id, webhook_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Webhook",
            id: webhook_id,
        }))?;

    let deliveries = WebhookRepo::list_deliveries_for_webhook(
        &state.pool,
        webhook_id,
        params.limit(),
        params.offset(),
    )
    .await?;
    Ok(Json(DataResponse { data: deliveries }))
}

/// POST /api/v1/orgs/{org_id}/webhooks/deliveries/{id}/replay
///
/// Create a fresh delivery for the same event as a delivered or failed
/// one and attempt it. The source row is not modified.
pub async fn replay_delivery(
    State(state): State<AppState>,
    Path((org_id, delivery_id)): Path<(DbId, DbId)>,
) -> AppResult<impl IntoResponse> {
    let source = WebhookRepo::find_delivery(&state.pool, org_id, delivery_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "WebhookDelivery",
            id: delivery_id,
        }))?;

    if !source.status().is_some_and(|s| s.is_terminal()) {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Delivery {delivery_id} is still {}; only delivered or failed deliveries can be replayed",
            source.status
        ))));
    }

    let replay = WebhookRepo::replay_delivery(
        &state.pool,
        delivery_id,
        state.config.webhooks.max_attempts,
    )
    .await?
    .ok_or_else(|| {
        AppError::Core(CoreError::Conflict(format!(
            "Delivery {delivery_id} changed state concurrently"
        )))
    })?;

    tracing::info!(
        organization_id = org_id,
        delivery_id = replay.id,
        replay_of = delivery_id,
        "Webhook delivery replayed"
    );

    let dispatcher = Arc::clone(&state.dispatcher);
    let replay_id = replay.id;
    tokio::spawn(async move { dispatcher.deliver(replay_id).await });

    Ok((StatusCode::CREATED, Json(DataResponse { data: replay })))
}
