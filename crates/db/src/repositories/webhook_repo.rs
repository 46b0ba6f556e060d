//! Repository for the `webhooks` and `webhook_deliveries` tables.
//!
//! Delivery rows move `pending -> in_flight -> {pending, delivered, failed}`.
//! Claiming sets an expiring lease; every result write is guarded on the
//! row still carrying the lease the worker claimed, so a late writer whose
//! lease was taken over changes nothing.

use sqlx::PgPool;
use leadq_core::types::{DbId, Timestamp};

use crate::models::webhook::{ClaimedDelivery, CreateWebhook, Webhook, WebhookDelivery};

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

const WEBHOOK_COLUMNS: &str = "\
    id, organization_id, name, url, secret, event_types, is_active, \
    last_triggered_at, failure_count, created_at, updated_at";

const DELIVERY_COLUMNS: &str = "\
    id, webhook_id, event, payload, status, response_status, response_body, \
    attempt_count, max_attempts, next_retry_at, lease_expires_at, \
    delivered_at, replay_of, created_at, updated_at";

const CLAIMED_COLUMNS: &str = "\
    d.id, d.webhook_id, d.event, d.payload, d.attempt_count, d.max_attempts, \
    d.lease_expires_at, w.url, w.secret";

/// Outcome of a failed attempt, as computed by the retry policy.
#[derive(Debug, Clone)]
pub struct FailedAttempt<'a> {
    pub attempt_count: i32,
    /// `None` when attempts are exhausted.
    pub next_retry_at: Option<Timestamp>,
    pub response_status: Option<i16>,
    pub response_body: Option<&'a str>,
}

/// Provides subscription lookup and delivery bookkeeping.
pub struct WebhookRepo;

impl WebhookRepo {
    // -----------------------------------------------------------------------
    // Webhooks
    // -----------------------------------------------------------------------

    pub async fn create(
        pool: &PgPool,
        organization_id: DbId,
        input: &CreateWebhook,
    ) -> Result<Webhook, sqlx::Error> {
        let query = format!(
            "INSERT INTO webhooks (organization_id, name, url, secret, event_types, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {WEBHOOK_COLUMNS}"
        );
        sqlx::query_as::<_, Webhook>(&query)
            .bind(organization_id)
            .bind(&input.name)
            .bind(&input.url)
            .bind(&input.secret)
            .bind(serde_json::json!(input.event_types))
            .bind(input.is_active.unwrap_or(true))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<Webhook>, sqlx::Error> {
        let query = format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = $1 AND organization_id = $2"
        );
        sqlx::query_as::<_, Webhook>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Active subscriptions of an organization that include `event`.
    pub async fn list_active_for_event(
        pool: &PgPool,
        organization_id: DbId,
        event: &str,
    ) -> Result<Vec<Webhook>, sqlx::Error> {
        let query = format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks \
             WHERE organization_id = $1 AND is_active AND event_types ? $2 \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, Webhook>(&query)
            .bind(organization_id)
            .bind(event)
            .fetch_all(pool)
            .await
    }

    /// Update `last_triggered_at` on a webhook.
    pub async fn touch_triggered(pool: &PgPool, webhook_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE webhooks SET last_triggered_at = NOW() WHERE id = $1")
            .bind(webhook_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Increment `failure_count` on a webhook.
    pub async fn increment_failure_count(
        pool: &PgPool,
        webhook_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE webhooks SET failure_count = failure_count + 1 WHERE id = $1")
            .bind(webhook_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deliveries
    // -----------------------------------------------------------------------

    /// Create a pending delivery for one event occurrence.
    pub async fn create_delivery(
        pool: &PgPool,
        webhook_id: DbId,
        event: &str,
        payload: &serde_json::Value,
        max_attempts: i32,
    ) -> Result<WebhookDelivery, sqlx::Error> {
        let query = format!(
            "INSERT INTO webhook_deliveries (webhook_id, event, payload, max_attempts) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {DELIVERY_COLUMNS}"
        );
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(webhook_id)
            .bind(event)
            .bind(payload)
            .bind(max_attempts)
            .fetch_one(pool)
            .await
    }

    /// Claim one specific pending delivery for an immediate attempt.
    ///
    /// Returns `None` if another worker already holds it.
    pub async fn claim_delivery(
        pool: &PgPool,
        delivery_id: DbId,
        lease_secs: f64,
    ) -> Result<Option<ClaimedDelivery>, sqlx::Error> {
        let query = format!(
            "UPDATE webhook_deliveries d SET \
                 status = 'in_flight', \
                 lease_expires_at = NOW() + make_interval(secs => $2) \
             FROM webhooks w \
             WHERE w.id = d.webhook_id \
               AND d.id = $1 \
               AND d.status = 'pending' \
               AND d.attempt_count < d.max_attempts \
             RETURNING {CLAIMED_COLUMNS}"
        );
        sqlx::query_as::<_, ClaimedDelivery>(&query)
            .bind(delivery_id)
            .bind(lease_secs)
            .fetch_optional(pool)
            .await
    }

    /// Claim up to `limit` deliveries that are due: pending with
    /// `next_retry_at <= now`, or in flight with an expired lease.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent sweepers never claim the
    /// same row.
    pub async fn claim_due(
        pool: &PgPool,
        limit: i64,
        lease_secs: f64,
    ) -> Result<Vec<ClaimedDelivery>, sqlx::Error> {
        let query = format!(
            "UPDATE webhook_deliveries d SET \
                 status = 'in_flight', \
                 lease_expires_at = NOW() + make_interval(secs => $2) \
             FROM webhooks w \
             WHERE w.id = d.webhook_id \
               AND d.id IN ( \
                   SELECT id FROM webhook_deliveries \
                   WHERE ((status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= NOW())) \
                       OR (status = 'in_flight' AND lease_expires_at <= NOW())) \
                     AND attempt_count < max_attempts \
                     AND delivered_at IS NULL \
                   ORDER BY COALESCE(next_retry_at, created_at) ASC \
                   LIMIT $1 \
                   FOR UPDATE SKIP LOCKED \
               ) \
             RETURNING {CLAIMED_COLUMNS}"
        );
        sqlx::query_as::<_, ClaimedDelivery>(&query)
            .bind(limit)
            .bind(lease_secs)
            .fetch_all(pool)
            .await
    }

    /// Record a 2xx response. Sets `delivered_at` once; returns `false` if
    /// the row was no longer held by this attempt.
    pub async fn mark_delivered(
        pool: &PgPool,
        claim: &ClaimedDelivery,
        response_status: i16,
        response_body: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE webhook_deliveries SET \
                 status = 'delivered', \
                 attempt_count = attempt_count + 1, \
                 response_status = $3, \
                 response_body = $4, \
                 delivered_at = NOW(), \
                 next_retry_at = NULL, \
                 lease_expires_at = NULL \
             WHERE id = $1 \
               AND status = 'in_flight' \
               AND lease_expires_at = $2 \
               AND delivered_at IS NULL",
        )
        .bind(claim.id)
        .bind(claim.lease_expires_at)
        .bind(response_status)
        .bind(response_body)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a failed attempt: back to `pending` with a retry time, or
    /// terminally `failed` when `next_retry_at` is `None`.
    pub async fn record_failure(
        pool: &PgPool,
        claim: &ClaimedDelivery,
        failure: &FailedAttempt<'_>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE webhook_deliveries SET \
                 status = CASE WHEN $4::timestamptz IS NULL THEN 'failed' ELSE 'pending' END, \
                 attempt_count = $3, \
                 next_retry_at = $4, \
                 response_status = $5, \
                 response_body = $6, \
                 lease_expires_at = NULL \
             WHERE id = $1 \
               AND status = 'in_flight' \
               AND lease_expires_at = $2 \
               AND delivered_at IS NULL",
        )
        .bind(claim.id)
        .bind(claim.lease_expires_at)
        .bind(failure.attempt_count)
        .bind(failure.next_retry_at)
        .bind(failure.response_status)
        .bind(failure.response_body)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List deliveries for a webhook, newest first.
    pub async fn list_deliveries_for_webhook(
        pool: &PgPool,
        webhook_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookDelivery>, sqlx::Error> {
        let query = format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries \
             WHERE webhook_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(webhook_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Deliveries not yet in a terminal state, across all organizations.
    pub async fn count_backlog(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM webhook_deliveries \
             WHERE status IN ('pending', 'in_flight')",
        )
        .fetch_one(pool)
        .await
    }

    /// Find a delivery whose webhook belongs to the organization.
    pub async fn find_delivery(
        pool: &PgPool,
        organization_id: DbId,
        delivery_id: DbId,
    ) -> Result<Option<WebhookDelivery>, sqlx::Error> {
        let query = format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries \
             WHERE id = $1 \
               AND webhook_id IN (SELECT id FROM webhooks WHERE organization_id = $2)"
        );
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(delivery_id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Create a fresh pending delivery for the same event as a terminal one.
    ///
    /// The original row is left untouched. Returns `None` if the source is
    /// not terminal.
    pub async fn replay_delivery(
        pool: &PgPool,
        delivery_id: DbId,
        max_attempts: i32,
    ) -> Result<Option<WebhookDelivery>, sqlx::Error> {
        let query = format!(
            "INSERT INTO webhook_deliveries (webhook_id, event, payload, max_attempts, replay_of) \
             SELECT webhook_id, event, payload, $2, id FROM webhook_deliveries \
             WHERE id = $1 AND status IN ('delivered', 'failed') \
             RETURNING {DELIVERY_COLUMNS}"
        );
        sqlx::query_as::<_, WebhookDelivery>(&query)
            .bind(delivery_id)
            .bind(max_attempts)
            .fetch_optional(pool)
            .await
    }
}
