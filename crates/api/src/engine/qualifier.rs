//! One scoring pass for one lead.
//!
//! Loads a consistent snapshot (criteria, settings, enrichment, active
//! model), extracts features, scores, blends, persists the result as the
//! lead's current qualification and publishes change events. Webhook
//! delivery happens off the bus, so the caller never waits on subscribers.

use std::sync::Arc;

use leadq_core::blend::{blend, BlendSettings, BlendStrategy};
use leadq_core::criteria::{validate_criteria, IcpCriterion};
use leadq_core::error::CoreError;
use leadq_core::features::{extract, FeatureVector};
use leadq_core::scoring::{score, ScoringConfig};
use leadq_core::types::DbId;
use leadq_core::webhook::{EVENT_LEAD_LABEL_CHANGED, EVENT_LEAD_QUALIFIED};
use leadq_db::models::qualification::QualificationResultRow;
use leadq_db::repositories::{
    CriteriaRepo, EnrichmentRepo, LeadRepo, QualificationRepo, ScoringSettingsRepo,
};
use leadq_db::DbPool;
use leadq_events::{EventBus, EventSource, PlatformEvent};
use serde_json::json;

use crate::engine::registry::ModelRegistry;
use crate::error::{AppError, AppResult};

pub struct Qualifier {
    pool: DbPool,
    event_bus: Arc<EventBus>,
    registry: Arc<ModelRegistry>,
    config: ScoringConfig,
}

impl Qualifier {
    pub fn new(
        pool: DbPool,
        event_bus: Arc<EventBus>,
        registry: Arc<ModelRegistry>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            pool,
            event_bus,
            registry,
            config,
        }
    }

    /// Score a lead and make the result its current qualification.
    ///
    /// Configuration problems (no criteria, bad thresholds) fail the call
    /// and write nothing; the lead stays as it was.
    pub async fn qualify(
        &self,
        organization_id: DbId,
        lead_id: DbId,
    ) -> AppResult<QualificationResultRow> {
        let lead = LeadRepo::find_by_id(&self.pool, organization_id, lead_id)
            .await?
            .ok_or(AppError::Core(CoreError::NotFound {
                entity: "Lead",
                id: lead_id,
            }))?;

        let criteria = self.load_criteria(organization_id).await?;
        let settings = self.load_settings(organization_id).await?;

        let enrichment = EnrichmentRepo::find_for_lead(&self.pool, lead_id)
            .await?
            .map(|row| row.to_domain());

        let features = match extract(&lead.profile(), enrichment.as_ref()) {
            Ok(features) => features,
            Err(e) => {
                tracing::warn!(
                    organization_id,
                    lead_id,
                    error = %e,
                    "Feature extraction impossible, scoring with no data"
                );
                FeatureVector::all_missing()
            }
        };

        let rule = score(&criteria, &features, &self.config)?;

        let active = self.registry.snapshot(&self.pool, organization_id).await?;
        let strategy = BlendStrategy::resolve(settings.policy, active, settings.model_weight);
        let result = blend(rule, &strategy, &features, &settings.thresholds);

        if result.degraded {
            tracing::warn!(
                organization_id,
                lead_id,
                model_version = ?result.model_version,
                "Model could not score lead, fell back to rule score"
            );
        }

        let recorded = QualificationRepo::record(&self.pool, organization_id, lead_id, &result)
            .await?
            .ok_or(AppError::Core(CoreError::NotFound {
                entity: "Lead",
                id: lead_id,
            }))?;

        tracing::info!(
            organization_id,
            lead_id,
            qualification_id = recorded.row.id,
            score = result.score,
            label = %result.label,
            degraded = result.degraded,
            "Lead qualified"
        );

        self.publish(organization_id, &recorded.row, recorded.previous_label.as_deref());
        Ok(recorded.row)
    }

    async fn load_criteria(&self, organization_id: DbId) -> AppResult<Vec<IcpCriterion>> {
        let criteria = CriteriaRepo::list_for_org(&self.pool, organization_id)
            .await?
            .iter()
            .map(|row| row.to_domain())
            .collect::<Result<Vec<_>, _>>()?;
        validate_criteria(&criteria)?;
        Ok(criteria)
    }

    async fn load_settings(&self, organization_id: DbId) -> AppResult<BlendSettings> {
        match ScoringSettingsRepo::find(&self.pool, organization_id).await? {
            Some(row) => Ok(row.to_domain()?),
            None => Ok(BlendSettings::default()),
        }
    }

    fn publish(&self, organization_id: DbId, row: &QualificationResultRow, previous: Option<&str>) {
        self.event_bus.publish(
            PlatformEvent::new(
                EVENT_LEAD_QUALIFIED,
                organization_id,
                EventSource::Lead(row.lead_id),
                json!({
                    "lead_id": row.lead_id,
                    "qualification_id": row.id,
                    "score": row.score,
                    "label": row.label,
                    "recommended_action": row.recommended_action,
                    "model_version": row.model_version,
                    "degraded": row.degraded,
                }),
            ),
        );

        if previous != Some(row.label.as_str()) {
            self.event_bus.publish(
                PlatformEvent::new(
                    EVENT_LEAD_LABEL_CHANGED,
                    organization_id,
                    EventSource::Lead(row.lead_id),
                    json!({
                        "lead_id": row.lead_id,
                        "previous_label": previous,
                        "label": row.label,
                        "score": row.score,
                    }),
                ),
            );
        }
    }
}
