//! Forwards bus events to webhook subscribers.
//!
//! [`WebhookRouter`] listens on the [`EventBus`](crate::bus::EventBus) and
//! hands every webhook-visible event to the [`NotificationDispatcher`].
//! Each emit runs on its own task so a slow subscriber never holds up the
//! receive loop.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::bus::PlatformEvent;
use crate::dispatcher::NotificationDispatcher;

pub struct WebhookRouter {
    dispatcher: Arc<NotificationDispatcher>,
}

impl WebhookRouter {
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Run until the bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.route(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Webhook router lagged, some events were not emitted");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, webhook router shutting down");
                    break;
                }
            }
        }
    }

    fn route(&self, event: PlatformEvent) {
        if !event.is_deliverable() {
            return;
        }
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            if let Err(e) = dispatcher
                .emit(event.organization_id, &event.event_type, event.payload)
                .await
            {
                tracing::error!(
                    organization_id = event.organization_id,
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to emit webhook event"
                );
            }
        });
    }
}
