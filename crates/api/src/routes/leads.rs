use axum::routing::{get, post};
use axum::Router;

use crate::handlers::leads;
use crate::state::AppState;

/// Routes mounted at `/orgs/{org_id}/leads`.
///
/// ```text
/// POST /{lead_id}/qualify         -> qualify
/// GET  /{lead_id}/qualifications  -> list_qualifications
/// POST /{lead_id}/outcomes        -> record_outcome
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{lead_id}/qualify", post(leads::qualify))
        .route("/{lead_id}/qualifications", get(leads::list_qualifications))
        .route("/{lead_id}/outcomes", post(leads::record_outcome))
}
