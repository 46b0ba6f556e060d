use leadq_core::types::{DbId, Timestamp};
use leadq_core::webhook::DeliveryStatus;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

/// A row from the `webhooks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Webhook {
    pub id: DbId,
    pub organization_id: DbId,
    pub name: String,
    pub url: String,
    #[serde(skip_serializing)]
    pub secret: String,
    /// Array of subscribed event type names.
    pub event_types: serde_json::Value,
    pub is_active: bool,
    pub last_triggered_at: Option<Timestamp>,
    pub failure_count: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a webhook subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWebhook {
    pub name: String,
    pub url: String,
    pub secret: String,
    pub event_types: Vec<String>,
    pub is_active: Option<bool>,
}

impl Webhook {
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.event_types
            .as_array()
            .is_some_and(|types| types.iter().any(|t| t.as_str() == Some(event)))
    }
}

// ---------------------------------------------------------------------------
// Webhook Delivery
// ---------------------------------------------------------------------------

/// A row from the `webhook_deliveries` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookDelivery {
    pub id: DbId,
    pub webhook_id: DbId,
    pub event: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub response_status: Option<i16>,
    pub response_body: Option<String>,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_retry_at: Option<Timestamp>,
    pub lease_expires_at: Option<Timestamp>,
    pub delivered_at: Option<Timestamp>,
    pub replay_of: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WebhookDelivery {
    pub fn status(&self) -> Option<DeliveryStatus> {
        self.status.parse().ok()
    }
}

/// A delivery claimed for sending, joined with its subscription target.
#[derive(Debug, Clone, FromRow)]
pub struct ClaimedDelivery {
    pub id: DbId,
    pub webhook_id: DbId,
    pub event: String,
    pub payload: serde_json::Value,
    pub attempt_count: i32,
    /// Cap recorded when the row was created.
    pub max_attempts: i32,
    /// Identifies this claim; result writes must present it.
    pub lease_expires_at: Option<Timestamp>,
    pub url: String,
    pub secret: String,
}
