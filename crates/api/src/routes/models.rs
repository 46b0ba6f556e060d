use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::models;
use crate::state::AppState;

/// Routes mounted at `/orgs/{org_id}/models`.
///
/// ```text
/// GET    /                     -> list
/// GET    /active               -> active
/// GET    /status               -> status
/// POST   /train                -> train
/// DELETE /training             -> cancel_training
/// POST   /{version}/activate   -> activate
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(models::list))
        .route("/active", get(models::active))
        .route("/status", get(models::status))
        .route("/train", post(models::train))
        .route("/training", delete(models::cancel_training))
        .route("/{version}/activate", post(models::activate))
}
