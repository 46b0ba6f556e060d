//! Integration tests for webhook delivery logs and replay.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use common::{body_json, get, post_empty, seed_webhook, StubTransport, ORG, OTHER_ORG};
use leadq_api::router::build_app_router;
use leadq_db::repositories::WebhookRepo;
use serde_json::json;
use sqlx::PgPool;

async fn wait_for_sends(transport: &StubTransport, expected: usize) {
    for _ in 0..50 {
        if transport.sent() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("expected {expected} sends, saw {}", transport.sent());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn emitted_event_is_delivered_and_logged(pool: PgPool) {
    let webhook = seed_webhook(&pool, ORG, &["lead.qualified"]).await;
    seed_webhook(&pool, OTHER_ORG, &["lead.qualified"]).await;
    seed_webhook(&pool, ORG, &["model.activated"]).await;

    let transport = Arc::new(StubTransport::default());
    let state = common::build_test_state(pool.clone(), Arc::clone(&transport));
    let ids = state
        .dispatcher
        .emit(ORG, "lead.qualified", json!({"lead_id": 1, "score": 100.0}))
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(transport.sent(), 1);

    let app = build_app_router(state, &common::test_config());
    let uri = format!("/api/v1/orgs/{ORG}/webhooks/{}/deliveries", webhook.id);
    let response = get(app, &uri).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let rows = json["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], "delivered");
    assert_eq!(rows[0]["attempt_count"], 1);
    assert_eq!(rows[0]["response_status"], 200);
    assert_eq!(rows[0]["payload"]["event"], "lead.qualified");

    let hook = WebhookRepo::find_by_id(&pool, ORG, webhook.id).await.unwrap().unwrap();
    assert!(hook.last_triggered_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn replay_creates_a_new_delivery_and_sends_it(pool: PgPool) {
    seed_webhook(&pool, ORG, &["lead.qualified"]).await;

    let transport = Arc::new(StubTransport::default());
    let state = common::build_test_state(pool.clone(), Arc::clone(&transport));
    let ids = state
        .dispatcher
        .emit(ORG, "lead.qualified", json!({"lead_id": 1}))
        .await
        .unwrap();
    let app = build_app_router(state, &common::test_config());

    let uri = format!("/api/v1/orgs/{ORG}/webhooks/deliveries/{}/replay", ids[0]);
    let response = post_empty(app, &uri).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    assert_eq!(json["data"]["replay_of"], ids[0]);
    assert_ne!(json["data"]["id"], ids[0]);

    wait_for_sends(&transport, 2).await;

    let source = WebhookRepo::find_delivery(&pool, ORG, ids[0]).await.unwrap().unwrap();
    assert_eq!(source.status, "delivered");
    assert_eq!(source.attempt_count, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn pending_deliveries_cannot_be_replayed(pool: PgPool) {
    let webhook = seed_webhook(&pool, ORG, &["lead.qualified"]).await;
    let pending = WebhookRepo::create_delivery(&pool, webhook.id, "lead.qualified", &json!({}), 5)
        .await
        .unwrap();

    let app = common::build_test_app(pool);
    let uri = format!("/api/v1/orgs/{ORG}/webhooks/deliveries/{}/replay", pending.id);
    let response = post_empty(app, &uri).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn other_organizations_cannot_see_deliveries(pool: PgPool) {
    let webhook = seed_webhook(&pool, ORG, &["lead.qualified"]).await;
    let delivery = WebhookRepo::create_delivery(&pool, webhook.id, "lead.qualified", &json!({}), 5)
        .await
        .unwrap();
    let app = common::build_test_app(pool);

    let uri = format!("/api/v1/orgs/{OTHER_ORG}/webhooks/{}/deliveries", webhook.id);
    assert_eq!(get(app.clone(), &uri).await.status(), StatusCode::NOT_FOUND);

    let uri = format!("/api/v1/orgs/{OTHER_ORG}/webhooks/deliveries/{}/replay", delivery.id);
    assert_eq!(post_empty(app, &uri).await.status(), StatusCode::NOT_FOUND);
}
