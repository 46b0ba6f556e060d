//! Postgres-backed [`DeliveryStore`].

use async_trait::async_trait;
use leadq_core::types::DbId;
use leadq_db::models::webhook::ClaimedDelivery;
use leadq_db::repositories::webhook_repo::FailedAttempt;
use leadq_db::repositories::WebhookRepo;
use leadq_db::DbPool;

use crate::dispatcher::{DeliveryStore, DispatchError};

/// [`DeliveryStore`] over the `webhooks` and `webhook_deliveries` tables.
#[derive(Clone)]
pub struct PgDeliveryStore {
    pool: DbPool,
}

impl PgDeliveryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryStore for PgDeliveryStore {
    async fn matching_subscriptions(
        &self,
        organization_id: DbId,
        event: &str,
    ) -> Result<Vec<DbId>, DispatchError> {
        let hooks = WebhookRepo::list_active_for_event(&self.pool, organization_id, event).await?;
        Ok(hooks.into_iter().map(|h| h.id).collect())
    }

    async fn create_delivery(
        &self,
        webhook_id: DbId,
        event: &str,
        payload: &serde_json::Value,
        max_attempts: i32,
    ) -> Result<DbId, DispatchError> {
        let delivery =
            WebhookRepo::create_delivery(&self.pool, webhook_id, event, payload, max_attempts)
                .await?;
        Ok(delivery.id)
    }

    async fn claim(
        &self,
        delivery_id: DbId,
        lease_secs: f64,
    ) -> Result<Option<ClaimedDelivery>, DispatchError> {
        Ok(WebhookRepo::claim_delivery(&self.pool, delivery_id, lease_secs).await?)
    }

    async fn claim_due(
        &self,
        limit: i64,
        lease_secs: f64,
    ) -> Result<Vec<ClaimedDelivery>, DispatchError> {
        Ok(WebhookRepo::claim_due(&self.pool, limit, lease_secs).await?)
    }

    async fn mark_delivered(
        &self,
        claim: &ClaimedDelivery,
        response_status: i16,
        response_body: Option<&str>,
    ) -> Result<bool, DispatchError> {
        Ok(WebhookRepo::mark_delivered(&self.pool, claim, response_status, response_body).await?)
    }

    async fn record_failure(
        &self,
        claim: &ClaimedDelivery,
        failure: &FailedAttempt<'_>,
    ) -> Result<bool, DispatchError> {
        Ok(WebhookRepo::record_failure(&self.pool, claim, failure).await?)
    }

    async fn touch_triggered(&self, webhook_id: DbId) -> Result<(), DispatchError> {
        Ok(WebhookRepo::touch_triggered(&self.pool, webhook_id).await?)
    }

    async fn increment_failure_count(&self, webhook_id: DbId) -> Result<(), DispatchError> {
        Ok(WebhookRepo::increment_failure_count(&self.pool, webhook_id).await?)
    }
}
