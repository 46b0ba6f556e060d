//! Health endpoint and middleware behaviour.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, seed_webhook, ORG};
use leadq_db::repositories::WebhookRepo;
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../db/migrations")]
async fn health_reports_database_and_empty_backlog(pool: PgPool) {
    let response = get(common::build_test_app(pool), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["db_healthy"], true);
    assert_eq!(json["delivery_backlog"], 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn health_counts_pending_deliveries(pool: PgPool) {
    let webhook = seed_webhook(&pool, ORG, &["lead.qualified"]).await;
    for _ in 0..2 {
        WebhookRepo::create_delivery(&pool, webhook.id, "lead.qualified", &json!({}), 5)
            .await
            .unwrap();
    }

    let json = body_json(get(common::build_test_app(pool), "/health").await).await;
    assert_eq!(json["delivery_backlog"], 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_api_route_is_404(pool: PgPool) {
    let response = get(common::build_test_app(pool), "/api/v1/nowhere").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn every_response_carries_a_request_id(pool: PgPool) {
    let response = get(common::build_test_app(pool), "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("x-request-id header");
    // A generated UUID.
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}
