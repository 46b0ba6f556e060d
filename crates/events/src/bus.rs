//! In-process event bus for scoring engine events.
//!
//! The engine publishes a [`PlatformEvent`] whenever a lead is qualified, its
//! label moves, or a model version is activated. Publishing never waits for
//! subscribers; the webhook router picks events up on its own task.

use chrono::{DateTime, Utc};
use leadq_core::types::DbId;
use leadq_core::webhook::KNOWN_EVENTS;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// The entity an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EventSource {
    Lead(DbId),
    ScoringModel(DbId),
}

/// An engine event, always owned by exactly one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated name, one of the webhook event types.
    pub event_type: String,
    pub organization_id: DbId,
    pub source: EventSource,
    /// Body forwarded to webhook subscribers as the envelope `payload`.
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    pub fn new(
        event_type: impl Into<String>,
        organization_id: DbId,
        source: EventSource,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            organization_id,
            source,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Whether webhook subscribers can subscribe to this event type.
    pub fn is_deliverable(&self) -> bool {
        KNOWN_EVENTS.contains(&self.event_type.as_str())
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast fan-out of [`PlatformEvent`]s.
///
/// A full buffer drops the oldest events; slow receivers then see
/// `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Having none is not an error.
    pub fn publish(&self, event: PlatformEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("Event published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
