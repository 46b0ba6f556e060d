//! Notification dispatcher: reliable webhook delivery with retry.
//!
//! [`NotificationDispatcher::emit`] creates one delivery row per active
//! subscription matching the event and attempts each immediately. Failed
//! attempts go back to `pending` with a backoff `next_retry_at`;
//! [`NotificationDispatcher::run`] sweeps due rows on an interval until the
//! attempt cap turns them terminally `failed`.
//!
//! Every attempt works on a claimed row (`in_flight` under a lease), so the
//! same delivery is never sent by two workers at once. A worker that dies
//! mid-attempt leaves a lease that expires and the sweep re-claims it, which
//! makes delivery at-least-once; receivers deduplicate on the delivery id
//! header.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use leadq_core::error::CoreError;
use leadq_core::types::DbId;
use leadq_core::webhook::{
    is_success_status, signature_header_value, truncate_response_body, FailureTransition,
    RetryPolicy, WebhookEnvelope, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER,
};
use leadq_db::models::webhook::ClaimedDelivery;
use leadq_db::repositories::webhook_repo::FailedAttempt;
use tokio_util::sync::CancellationToken;

use crate::delivery::{DeliveryTransport, OutboundRequest};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Failures of the dispatcher itself. Subscriber failures are not errors;
/// they are recorded on the delivery row.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Signing(#[from] CoreError),

    #[error("Payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Store seam
// ---------------------------------------------------------------------------

/// Persistence operations the dispatcher needs.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Ids of active subscriptions of the organization that include `event`.
    async fn matching_subscriptions(
        &self,
        organization_id: DbId,
        event: &str,
    ) -> Result<Vec<DbId>, DispatchError>;

    async fn create_delivery(
        &self,
        webhook_id: DbId,
        event: &str,
        payload: &serde_json::Value,
        max_attempts: i32,
    ) -> Result<DbId, DispatchError>;

    /// Claim one pending delivery. `None` if someone else holds it.
    async fn claim(
        &self,
        delivery_id: DbId,
        lease_secs: f64,
    ) -> Result<Option<ClaimedDelivery>, DispatchError>;

    /// Claim due deliveries and expired leases.
    async fn claim_due(
        &self,
        limit: i64,
        lease_secs: f64,
    ) -> Result<Vec<ClaimedDelivery>, DispatchError>;

    /// `false` if the claim was lost before the write.
    async fn mark_delivered(
        &self,
        claim: &ClaimedDelivery,
        response_status: i16,
        response_body: Option<&str>,
    ) -> Result<bool, DispatchError>;

    /// `false` if the claim was lost before the write.
    async fn record_failure(
        &self,
        claim: &ClaimedDelivery,
        failure: &FailedAttempt<'_>,
    ) -> Result<bool, DispatchError>;

    async fn touch_triggered(&self, webhook_id: DbId) -> Result<(), DispatchError>;

    async fn increment_failure_count(&self, webhook_id: DbId) -> Result<(), DispatchError>;
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub retry: RetryPolicy,
    pub lease_secs: f64,
    pub sweep_batch: i64,
    pub sweep_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            lease_secs: 60.0,
            sweep_batch: 50,
            sweep_interval: Duration::from_secs(15),
        }
    }
}

/// Result of one attempt on a claimed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    Retrying { attempt_count: i32 },
    Failed { attempt_count: i32 },
    /// The lease expired and another worker took the row over; nothing
    /// was written.
    ClaimLost,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct NotificationDispatcher {
    store: Arc<dyn DeliveryStore>,
    transport: Arc<dyn DeliveryTransport>,
    config: DispatcherConfig,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        transport: Arc<dyn DeliveryTransport>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Create and attempt one delivery per matching subscription.
    ///
    /// Returns the ids of the created deliveries. Attempts run concurrently;
    /// an attempt that errors is left for the sweep.
    pub async fn emit(
        &self,
        organization_id: DbId,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<Vec<DbId>, DispatchError> {
        let subscriptions = self
            .store
            .matching_subscriptions(organization_id, event)
            .await?;
        if subscriptions.is_empty() {
            tracing::debug!(organization_id, event, "No subscriptions for event");
            return Ok(Vec::new());
        }

        let envelope = serde_json::to_value(WebhookEnvelope {
            event: event.to_string(),
            payload,
            timestamp: Utc::now(),
        })?;

        let mut delivery_ids = Vec::with_capacity(subscriptions.len());
        for webhook_id in subscriptions {
            let id = self
                .store
                .create_delivery(webhook_id, event, &envelope, self.config.retry.max_attempts)
                .await?;
            delivery_ids.push(id);
        }

        tracing::info!(
            organization_id,
            event,
            deliveries = delivery_ids.len(),
            "Webhook deliveries created"
        );

        join_all(delivery_ids.iter().map(|&id| self.deliver(id))).await;
        Ok(delivery_ids)
    }

    /// Claim and attempt one pending delivery now. A delivery another worker
    /// holds is left alone; failures are logged and left for the sweep.
    pub async fn deliver(&self, delivery_id: DbId) {
        let claim = match self.store.claim(delivery_id, self.config.lease_secs).await {
            Ok(Some(claim)) => claim,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(delivery_id, error = %e, "Failed to claim delivery");
                return;
            }
        };
        if let Err(e) = self.attempt(&claim).await {
            tracing::error!(delivery_id, error = %e, "Delivery attempt could not be recorded");
        }
    }

    /// Send one claimed delivery and record the result.
    pub async fn attempt(&self, claim: &ClaimedDelivery) -> Result<AttemptOutcome, DispatchError> {
        let body = serde_json::to_vec(&claim.payload)?;
        let signature = signature_header_value(&claim.secret, &body)?;
        let request = OutboundRequest {
            url: claim.url.clone(),
            body,
            headers: vec![
                (SIGNATURE_HEADER, signature),
                (EVENT_HEADER, claim.event.clone()),
                (DELIVERY_HEADER, claim.id.to_string()),
            ],
        };

        let (response_status, response_body) = match self.transport.send(&request).await {
            Ok(response) if is_success_status(response.status) => {
                let stored = truncate_response_body(&response.body);
                let written = self
                    .store
                    .mark_delivered(claim, response.status as i16, Some(&stored))
                    .await?;
                if !written {
                    tracing::warn!(delivery_id = claim.id, "Delivery claim lost before success write");
                    return Ok(AttemptOutcome::ClaimLost);
                }
                self.store.touch_triggered(claim.webhook_id).await?;
                tracing::info!(
                    delivery_id = claim.id,
                    webhook_id = claim.webhook_id,
                    status = response.status,
                    attempt = claim.attempt_count + 1,
                    "Webhook delivered"
                );
                return Ok(AttemptOutcome::Delivered);
            }
            Ok(response) => {
                tracing::warn!(
                    delivery_id = claim.id,
                    webhook_id = claim.webhook_id,
                    status = response.status,
                    "Webhook returned non-success status"
                );
                (
                    Some(response.status as i16),
                    truncate_response_body(&response.body),
                )
            }
            Err(e) => {
                tracing::warn!(
                    delivery_id = claim.id,
                    webhook_id = claim.webhook_id,
                    error = %e,
                    "Webhook transport failed"
                );
                (None, truncate_response_body(&e.to_string()))
            }
        };

        let transition = self
            .config
            .retry
            .after_failure(claim.attempt_count, claim.max_attempts, Utc::now());
        let (failure, outcome) = match transition {
            FailureTransition::Retry {
                attempt_count,
                next_retry_at,
            } => (
                FailedAttempt {
                    attempt_count,
                    next_retry_at: Some(next_retry_at),
                    response_status,
                    response_body: Some(&response_body),
                },
                AttemptOutcome::Retrying { attempt_count },
            ),
            FailureTransition::Exhausted { attempt_count } => (
                FailedAttempt {
                    attempt_count,
                    next_retry_at: None,
                    response_status,
                    response_body: Some(&response_body),
                },
                AttemptOutcome::Failed { attempt_count },
            ),
        };

        if !self.store.record_failure(claim, &failure).await? {
            tracing::warn!(delivery_id = claim.id, "Delivery claim lost before failure write");
            return Ok(AttemptOutcome::ClaimLost);
        }

        match outcome {
            AttemptOutcome::Failed { attempt_count } => {
                self.store.increment_failure_count(claim.webhook_id).await?;
                tracing::error!(
                    delivery_id = claim.id,
                    webhook_id = claim.webhook_id,
                    attempts = attempt_count,
                    "Webhook delivery permanently failed"
                );
            }
            AttemptOutcome::Retrying { attempt_count } => {
                tracing::info!(
                    delivery_id = claim.id,
                    attempts = attempt_count,
                    next_retry_at = ?failure.next_retry_at,
                    "Webhook delivery scheduled for retry"
                );
            }
            _ => {}
        }
        Ok(outcome)
    }

    /// Claim and attempt every due delivery (up to the batch size).
    ///
    /// Returns the number of deliveries attempted.
    pub async fn sweep_due(&self) -> Result<usize, DispatchError> {
        let claims = self
            .store
            .claim_due(self.config.sweep_batch, self.config.lease_secs)
            .await?;
        if claims.is_empty() {
            return Ok(0);
        }

        let results = join_all(claims.iter().map(|claim| self.attempt(claim))).await;
        for (claim, result) in claims.iter().zip(&results) {
            if let Err(e) = result {
                tracing::error!(delivery_id = claim.id, error = %e, "Retry attempt could not be recorded");
            }
        }
        Ok(claims.len())
    }

    /// Run the retry sweep until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        tracing::info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            batch = self.config.sweep_batch,
            "Webhook retry sweep started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Webhook retry sweep stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep_due().await {
                        Ok(0) => {}
                        Ok(attempted) => tracing::debug!(attempted, "Webhook retry sweep finished"),
                        Err(e) => tracing::error!(error = %e, "Webhook retry sweep failed"),
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
