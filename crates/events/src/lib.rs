//! Event bus and webhook notification infrastructure.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the domain event envelope published by the engine.
//! - [`delivery`]: the HTTP transport that posts signed webhook bodies.
//! - [`NotificationDispatcher`]: creates one delivery per matching
//!   subscription, attempts it, and retries due deliveries on a sweep.
//! - [`WebhookRouter`]: forwards bus events to the dispatcher.

pub mod bus;
pub mod delivery;
pub mod dispatcher;
pub mod router;
pub mod store;

pub use bus::{EventBus, EventSource, PlatformEvent};
pub use delivery::webhook::HttpTransport;
pub use dispatcher::{DispatchError, DispatcherConfig, NotificationDispatcher};
pub use router::WebhookRouter;
pub use store::PgDeliveryStore;
