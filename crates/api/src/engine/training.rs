//! Model training and activation.
//!
//! At most one training run per organization is in flight; a second request
//! is rejected with [`ModelError::TrainingInProgress`]. The fit itself runs
//! on the blocking pool so scoring is never held up, and it polls a
//! per-run [`CancellationToken`]. A cancelled or failed run writes nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use leadq_core::error::{CoreError, ModelError};
use leadq_core::features::{extract, FeatureVector};
use leadq_core::model::{Learner, ModelState, TrainingSample};
use leadq_core::outcome::latest_per_lead;
use leadq_core::training::{self, initial_training_due, retrain_recommended, TrainingConfig};
use leadq_core::types::DbId;
use leadq_core::webhook::EVENT_MODEL_ACTIVATED;
use leadq_db::models::scoring_model::ScoringModel;
use leadq_db::repositories::scoring_model_repo::NewScoringModel;
use leadq_db::repositories::{EnrichmentRepo, LeadRepo, OutcomeRepo, ScoringModelRepo};
use leadq_db::DbPool;
use leadq_events::{EventBus, EventSource, PlatformEvent};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::engine::registry::ModelRegistry;
use crate::error::{AppError, AppResult};

/// Derived retraining state of an organization.
#[derive(Debug, Clone, Serialize)]
pub struct RetrainStatus {
    /// Leads with at least one recorded outcome.
    pub total_outcomes: i64,
    pub active_model_version: Option<i32>,
    pub outcomes_since_active: Option<i64>,
    pub retrain_recommended: bool,
    pub training_in_flight: bool,
}

pub struct TrainingCoordinator {
    pool: DbPool,
    event_bus: Arc<EventBus>,
    registry: Arc<ModelRegistry>,
    learner: Arc<dyn Learner>,
    config: TrainingConfig,
    in_flight: Mutex<HashMap<DbId, CancellationToken>>,
}

/// Releases the organization's single-flight slot when the run ends.
///
/// Also cancels the run's token, so a request dropped mid-fit (client gone,
/// request timeout) stops the blocking fit instead of leaving it running
/// outside the slot.
struct FlightGuard<'a> {
    coordinator: &'a TrainingCoordinator,
    organization_id: DbId,
    token: CancellationToken,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.token.cancel();
        self.coordinator.flights().remove(&self.organization_id);
    }
}

/// Stored `trained_on_count`; a sample count past the column range is an
/// error rather than a clamped value.
fn stored_count(samples: usize) -> AppResult<i32> {
    i32::try_from(samples).map_err(|_| {
        AppError::InternalError(format!("Training sample count {samples} out of range"))
    })
}

impl TrainingCoordinator {
    pub fn new(
        pool: DbPool,
        event_bus: Arc<EventBus>,
        registry: Arc<ModelRegistry>,
        learner: Arc<dyn Learner>,
        config: TrainingConfig,
    ) -> Self {
        Self {
            pool,
            event_bus,
            registry,
            learner,
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn flights(&self) -> std::sync::MutexGuard<'_, HashMap<DbId, CancellationToken>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_in_flight(&self, organization_id: DbId) -> bool {
        self.flights().contains_key(&organization_id)
    }

    /// Cancel the organization's running training. Returns `false` if none
    /// was running.
    pub fn cancel(&self, organization_id: DbId) -> bool {
        match self.flights().get(&organization_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(organization_id, "Training cancellation requested");
                true
            }
            None => false,
        }
    }

    fn begin(
        &self,
        organization_id: DbId,
    ) -> Result<(FlightGuard<'_>, CancellationToken), ModelError> {
        let mut flights = self.flights();
        if flights.contains_key(&organization_id) {
            return Err(ModelError::TrainingInProgress(organization_id));
        }
        let token = CancellationToken::new();
        flights.insert(organization_id, token.clone());
        Ok((
            FlightGuard {
                coordinator: self,
                organization_id,
                token: token.clone(),
            },
            token,
        ))
    }

    /// Train a new model version from the organization's outcomes.
    ///
    /// Every successful call creates a new version. With `activate` the
    /// version is promoted in the same transaction that stores it.
    pub async fn train(&self, organization_id: DbId, activate: bool) -> AppResult<ScoringModel> {
        let (_guard, cancel) = self.begin(organization_id)?;
        tracing::info!(organization_id, activate, "Training started");

        let samples = self.load_samples(organization_id).await?;

        let learner = Arc::clone(&self.learner);
        let config = self.config;
        let fit_cancel = cancel.clone();
        let trained = tokio::task::spawn_blocking(move || {
            training::train(learner.as_ref(), &samples, &config, &fit_cancel)
        })
        .await
        .map_err(|e| AppError::InternalError(format!("Training task failed: {e}")))?;

        let trained = match trained {
            Ok(trained) => trained,
            Err(e) => {
                tracing::warn!(organization_id, error = %e, "Training produced no model");
                return Err(e.into());
            }
        };
        if cancel.is_cancelled() {
            tracing::info!(organization_id, "Training cancelled before storing");
            return Err(ModelError::Cancelled.into());
        }

        let trained_on_count = stored_count(trained.trained_on_count)?;
        let parameters = serde_json::to_value(&trained.parameters)
            .map_err(|e| AppError::InternalError(format!("Model serialization failed: {e}")))?;
        let metrics = serde_json::to_value(&trained.metrics)
            .map_err(|e| AppError::InternalError(format!("Metrics serialization failed: {e}")))?;

        let model = ScoringModelRepo::insert(
            &self.pool,
            organization_id,
            &NewScoringModel {
                algorithm: trained.parameters.algorithm(),
                parameters: &parameters,
                metrics: &metrics,
                trained_on_count,
            },
            activate,
        )
        .await?;

        tracing::info!(
            organization_id,
            model_version = model.model_version,
            trained_on_count = model.trained_on_count,
            accuracy = trained.metrics.accuracy,
            f1_score = trained.metrics.f1_score,
            activated = activate,
            "Training finished"
        );

        if activate {
            self.promoted(&model).await?;
        }
        Ok(model)
    }

    /// Promote a `trained` version. Superseded versions are never
    /// re-activated.
    pub async fn activate(
        &self,
        organization_id: DbId,
        model_version: i32,
    ) -> AppResult<ScoringModel> {
        let existing = ScoringModelRepo::find_by_version(&self.pool, organization_id, model_version)
            .await?
            .ok_or(AppError::Core(CoreError::NotFound {
                entity: "ScoringModel",
                id: DbId::from(model_version),
            }))?;

        let state = existing
            .state()
            .map_err(|e| AppError::InternalError(format!("Stored model state: {e}")))?;
        state.ensure_transition(ModelState::Active)?;

        let model = ScoringModelRepo::activate(&self.pool, organization_id, model_version)
            .await?
            .ok_or_else(|| {
                AppError::Core(CoreError::Conflict(format!(
                    "Model version {model_version} changed state concurrently"
                )))
            })?;

        tracing::info!(organization_id, model_version, "Model activated");
        self.promoted(&model).await?;
        Ok(model)
    }

    async fn promoted(&self, model: &ScoringModel) -> AppResult<()> {
        let active = model
            .to_active()
            .map_err(|e| AppError::InternalError(format!("Stored model parameters: {e}")))?;
        self.registry.set_active(model.organization_id, active).await;

        self.event_bus.publish(
            PlatformEvent::new(
                EVENT_MODEL_ACTIVATED,
                model.organization_id,
                EventSource::ScoringModel(model.id),
                json!({
                    "model_version": model.model_version,
                    "algorithm": model.algorithm,
                    "trained_on_count": model.trained_on_count,
                    "metrics": model.metrics,
                }),
            ),
        );
        Ok(())
    }

    /// Start the first training run in the background when the outcome
    /// threshold is reached and the organization has no model yet.
    ///
    /// Retraining with an existing model is only ever recommended.
    pub async fn maybe_start_initial(self: &Arc<Self>, organization_id: DbId) -> AppResult<bool> {
        if self.is_in_flight(organization_id) {
            return Ok(false);
        }
        let total = OutcomeRepo::count_labeled_leads(&self.pool, organization_id).await?;
        let has_model = ScoringModelRepo::exists_for_org(&self.pool, organization_id).await?;
        if !initial_training_due(total, has_model, &self.config) {
            return Ok(false);
        }

        tracing::info!(organization_id, total_outcomes = total, "Starting initial training");
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            match coordinator.train(organization_id, true).await {
                Ok(model) => tracing::info!(
                    organization_id,
                    model_version = model.model_version,
                    "Initial model trained"
                ),
                Err(AppError::Model(ModelError::TrainingInProgress(_))) => {}
                Err(e) => tracing::warn!(organization_id, error = %e, "Initial training failed"),
            }
        });
        Ok(true)
    }

    pub async fn status(&self, organization_id: DbId) -> AppResult<RetrainStatus> {
        let total_outcomes = OutcomeRepo::count_labeled_leads(&self.pool, organization_id).await?;
        let active = ScoringModelRepo::find_active(&self.pool, organization_id).await?;
        let trained_on = active.as_ref().map(|m| i64::from(m.trained_on_count));

        Ok(RetrainStatus {
            total_outcomes,
            active_model_version: active.as_ref().map(|m| m.model_version),
            outcomes_since_active: trained_on.map(|t| (total_outcomes - t).max(0)),
            retrain_recommended: retrain_recommended(total_outcomes, trained_on, &self.config),
            training_in_flight: self.is_in_flight(organization_id),
        })
    }

    /// Latest outcome per lead joined with the lead's features, in lead id
    /// order.
    async fn load_samples(&self, organization_id: DbId) -> AppResult<Vec<TrainingSample>> {
        let outcomes: Vec<_> = OutcomeRepo::list_for_org(&self.pool, organization_id)
            .await?
            .iter()
            .filter_map(|o| o.to_record())
            .collect();
        let latest = latest_per_lead(&outcomes);
        let lead_ids: Vec<DbId> = latest.iter().map(|o| o.lead_id).collect();

        let leads: BTreeMap<DbId, _> = LeadRepo::list_by_ids(&self.pool, organization_id, &lead_ids)
            .await?
            .into_iter()
            .map(|lead| (lead.id, lead))
            .collect();
        let enrichments: HashMap<DbId, _> = EnrichmentRepo::list_for_leads(&self.pool, &lead_ids)
            .await?
            .into_iter()
            .map(|row| (row.lead_id, row.to_domain()))
            .collect();

        Ok(latest
            .into_iter()
            .filter_map(|outcome| {
                let lead = leads.get(&outcome.lead_id)?;
                let features = extract(&lead.profile(), enrichments.get(&lead.id))
                    .unwrap_or_else(|_| FeatureVector::all_missing());
                Some(TrainingSample {
                    features,
                    converted: outcome.label.is_converted(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_count_past_column_range_is_an_error() {
        assert_eq!(stored_count(12).unwrap(), 12);
        assert!(matches!(
            stored_count(i32::MAX as usize + 1),
            Err(AppError::InternalError(_))
        ));
    }
}
