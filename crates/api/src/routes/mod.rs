pub mod health;
pub mod leads;
pub mod models;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /orgs/{org_id}/leads/{lead_id}/qualify              score a lead (POST)
/// /orgs/{org_id}/leads/{lead_id}/qualifications       qualification history (GET)
/// /orgs/{org_id}/leads/{lead_id}/outcomes             record outcome (POST)
///
/// /orgs/{org_id}/models                               list versions (GET)
/// /orgs/{org_id}/models/active                        active version (GET)
/// /orgs/{org_id}/models/status                        retraining status (GET)
/// /orgs/{org_id}/models/train                         train a version (POST)
/// /orgs/{org_id}/models/training                      cancel training (DELETE)
/// /orgs/{org_id}/models/{version}/activate            activate version (POST)
///
/// /orgs/{org_id}/webhooks/{id}/deliveries             delivery log (GET)
/// /orgs/{org_id}/webhooks/deliveries/{id}/replay      replay delivery (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/orgs/{org_id}/leads", leads::router())
        .nest("/orgs/{org_id}/models", models::router())
        .nest("/orgs/{org_id}/webhooks", webhooks::router())
}
