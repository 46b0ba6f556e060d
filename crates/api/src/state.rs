use std::sync::Arc;

use leadq_core::model::LogisticLearner;
use leadq_events::delivery::DeliveryTransport;
use leadq_events::{EventBus, NotificationDispatcher, PgDeliveryStore};

use crate::config::ServerConfig;
use crate::engine::{ModelRegistry, Qualifier, TrainingCoordinator};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: leadq_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Publishes qualification and model events.
    pub event_bus: Arc<EventBus>,
    pub qualifier: Arc<Qualifier>,
    pub training: Arc<TrainingCoordinator>,
    pub dispatcher: Arc<NotificationDispatcher>,
}

impl AppState {
    /// Wire the engine components around one pool and bus.
    ///
    /// The transport is injected so tests can replace HTTP delivery.
    pub fn new(
        pool: leadq_db::DbPool,
        config: ServerConfig,
        event_bus: Arc<EventBus>,
        transport: Arc<dyn DeliveryTransport>,
    ) -> Self {
        let registry = Arc::new(ModelRegistry::new());

        let qualifier = Arc::new(Qualifier::new(
            pool.clone(),
            Arc::clone(&event_bus),
            Arc::clone(&registry),
            config.scoring,
        ));
        let training = Arc::new(TrainingCoordinator::new(
            pool.clone(),
            Arc::clone(&event_bus),
            registry,
            Arc::new(LogisticLearner::default()),
            config.training,
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(PgDeliveryStore::new(pool.clone())),
            transport,
            config.webhooks.dispatcher_config(),
        ));

        Self {
            pool,
            config: Arc::new(config),
            event_bus,
            qualifier,
            training,
            dispatcher,
        }
    }
}
