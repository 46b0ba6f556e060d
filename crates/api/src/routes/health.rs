use axum::extract::State;
use axum::{routing::get, Json, Router};
use leadq_db::repositories::WebhookRepo;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the database is unreachable.
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
    /// Webhook deliveries still waiting for a terminal state. `null` when
    /// the database could not be queried.
    pub delivery_backlog: Option<i64>,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let backlog = match leadq_db::health_check(&state.pool).await {
        Ok(()) => WebhookRepo::count_backlog(&state.pool).await.ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the database");
            None
        }
    };
    let db_healthy = backlog.is_some();

    Json(HealthResponse {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        delivery_backlog: backlog,
    })
}

/// Root-level routes, outside `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
