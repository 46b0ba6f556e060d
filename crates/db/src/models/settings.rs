use leadq_core::blend::{BlendPolicy, BlendSettings};
use leadq_core::error::ScoringError;
use leadq_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `organization_scoring_settings` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrganizationScoringSettings {
    pub organization_id: DbId,
    pub hot_threshold: f64,
    pub warm_threshold: f64,
    pub blend_policy: String,
    pub model_weight: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for upserting scoring settings.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertScoringSettings {
    pub hot_threshold: f64,
    pub warm_threshold: f64,
    pub blend_policy: BlendPolicy,
    pub model_weight: f64,
}

impl OrganizationScoringSettings {
    pub fn to_domain(&self) -> Result<BlendSettings, ScoringError> {
        let policy: BlendPolicy = self
            .blend_policy
            .parse()
            .map_err(ScoringError::InvalidSetting)?;
        BlendSettings::new(
            self.hot_threshold,
            self.warm_threshold,
            policy,
            self.model_weight,
        )
    }
}
