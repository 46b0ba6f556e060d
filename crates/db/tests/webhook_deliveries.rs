//! Integration tests for webhook delivery bookkeeping.

use chrono::{Duration, Utc};
use leadq_db::models::webhook::CreateWebhook;
use leadq_db::repositories::webhook_repo::FailedAttempt;
use leadq_db::repositories::WebhookRepo;
use sqlx::PgPool;

const ORG: i64 = 1;

async fn webhook(pool: &PgPool, events: &[&str]) -> leadq_db::models::webhook::Webhook {
    WebhookRepo::create(
        pool,
        ORG,
        &CreateWebhook {
            name: "crm".to_string(),
            url: "https://example.test/hook".to_string(),
            secret: "whsec".to_string(),
            event_types: events.iter().map(|e| e.to_string()).collect(),
            is_active: None,
        },
    )
    .await
    .unwrap()
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn subscriptions_are_matched_by_event(pool: PgPool) {
    let hook = webhook(&pool, &["lead.qualified"]).await;
    assert!(hook.subscribes_to("lead.qualified"));

    let matched = WebhookRepo::list_active_for_event(&pool, ORG, "lead.qualified")
        .await
        .unwrap();
    assert_eq!(matched.len(), 1);
    assert!(WebhookRepo::list_active_for_event(&pool, ORG, "model.activated")
        .await
        .unwrap()
        .is_empty());
    assert!(WebhookRepo::list_active_for_event(&pool, 99, "lead.qualified")
        .await
        .unwrap()
        .is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delivered_row_is_claimed_once_and_never_again(pool: PgPool) {
    let hook = webhook(&pool, &["lead.qualified"]).await;
    let delivery = WebhookRepo::create_delivery(&pool, hook.id, "lead.qualified", &serde_json::json!({}), 5)
        .await
        .unwrap();

    let claim = WebhookRepo::claim_delivery(&pool, delivery.id, 60.0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claim.max_attempts, 5);
    // Second claim while in flight fails.
    assert!(WebhookRepo::claim_delivery(&pool, delivery.id, 60.0).await.unwrap().is_none());

    assert!(WebhookRepo::mark_delivered(&pool, &claim, 200, Some("ok")).await.unwrap());
    // Idempotent terminal state.
    assert!(!WebhookRepo::mark_delivered(&pool, &claim, 200, Some("ok")).await.unwrap());

    let stored = WebhookRepo::find_delivery(&pool, ORG, delivery.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "delivered");
    assert_eq!(stored.attempt_count, 1);
    assert!(stored.delivered_at.is_some());

    assert!(WebhookRepo::claim_due(&pool, 10, 60.0).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn failures_reschedule_then_terminate(pool: PgPool) {
    let hook = webhook(&pool, &["lead.qualified"]).await;
    let delivery = WebhookRepo::create_delivery(&pool, hook.id, "lead.qualified", &serde_json::json!({}), 2)
        .await
        .unwrap();

    let claim = WebhookRepo::claim_delivery(&pool, delivery.id, 60.0).await.unwrap().unwrap();
    let past = Utc::now() - Duration::seconds(1);
    let retried = WebhookRepo::record_failure(
        &pool,
        &claim,
        &FailedAttempt {
            attempt_count: 1,
            next_retry_at: Some(past),
            response_status: Some(503),
            response_body: None,
        },
    )
    .await
    .unwrap();
    assert!(retried);

    let due = WebhookRepo::claim_due(&pool, 10, 60.0).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].attempt_count, 1);

    WebhookRepo::record_failure(
        &pool,
        &due[0],
        &FailedAttempt {
            attempt_count: 2,
            next_retry_at: None,
            response_status: None,
            response_body: Some("connection refused"),
        },
    )
    .await
    .unwrap();

    let stored = WebhookRepo::find_delivery(&pool, ORG, delivery.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "failed");
    assert_eq!(stored.attempt_count, 2);
    assert!(WebhookRepo::claim_due(&pool, 10, 60.0).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn expired_lease_is_reclaimed_and_stale_writer_ignored(pool: PgPool) {
    let hook = webhook(&pool, &["lead.qualified"]).await;
    let delivery = WebhookRepo::create_delivery(&pool, hook.id, "lead.qualified", &serde_json::json!({}), 5)
        .await
        .unwrap();

    // Zero-length lease expires immediately.
    let stale = WebhookRepo::claim_delivery(&pool, delivery.id, 0.0).await.unwrap().unwrap();
    let fresh = WebhookRepo::claim_due(&pool, 10, 60.0).await.unwrap();
    assert_eq!(fresh.len(), 1);

    assert!(!WebhookRepo::mark_delivered(&pool, &stale, 200, None).await.unwrap());
    assert!(WebhookRepo::mark_delivered(&pool, &fresh[0], 200, None).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn replay_creates_a_new_row(pool: PgPool) {
    let hook = webhook(&pool, &["lead.qualified"]).await;
    let payload = serde_json::json!({"event": "lead.qualified"});
    let delivery = WebhookRepo::create_delivery(&pool, hook.id, "lead.qualified", &payload, 1)
        .await
        .unwrap();

    // Pending rows cannot be replayed.
    assert!(WebhookRepo::replay_delivery(&pool, delivery.id, 5).await.unwrap().is_none());

    let claim = WebhookRepo::claim_delivery(&pool, delivery.id, 60.0).await.unwrap().unwrap();
    WebhookRepo::record_failure(
        &pool,
        &claim,
        &FailedAttempt {
            attempt_count: 1,
            next_retry_at: None,
            response_status: Some(500),
            response_body: None,
        },
    )
    .await
    .unwrap();

    let replay = WebhookRepo::replay_delivery(&pool, delivery.id, 5).await.unwrap().unwrap();
    assert_ne!(replay.id, delivery.id);
    assert_eq!(replay.replay_of, Some(delivery.id));
    assert_eq!(replay.status, "pending");
    assert_eq!(replay.payload, payload);

    let original = WebhookRepo::find_delivery(&pool, ORG, delivery.id).await.unwrap().unwrap();
    assert_eq!(original.status, "failed");

    let listed = WebhookRepo::list_deliveries_for_webhook(&pool, hook.id, 10, 0).await.unwrap();
    assert_eq!(listed.len(), 2);
}
