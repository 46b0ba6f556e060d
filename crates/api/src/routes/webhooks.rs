use axum::routing::{get, post};
use axum::Router;

use crate::handlers::webhooks;
use crate::state::AppState;

/// Routes mounted at `/orgs/{org_id}/webhooks`.
///
/// ```text
/// GET  /{id}/deliveries            -> list_deliveries
/// POST /deliveries/{id}/replay     -> replay_delivery
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/deliveries", get(webhooks::list_deliveries))
        .route("/deliveries/{id}/replay", post(webhooks::replay_delivery))
}
