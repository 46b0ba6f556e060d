use leadq_core::model::{ActiveModel, ModelParameters, ModelState, PerformanceMetrics};
use leadq_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `scoring_models` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScoringModel {
    pub id: DbId,
    pub organization_id: DbId,
    pub model_version: i32,
    pub state: String,
    pub algorithm: String,
    #[serde(skip_serializing)]
    pub parameters: serde_json::Value,
    pub metrics: serde_json::Value,
    pub trained_on_count: i32,
    pub activated_at: Option<Timestamp>,
    pub superseded_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl ScoringModel {
    pub fn state(&self) -> Result<ModelState, String> {
        self.state.parse()
    }

    pub fn parameters(&self) -> Result<ModelParameters, serde_json::Error> {
        serde_json::from_value(self.parameters.clone())
    }

    pub fn metrics(&self) -> Result<PerformanceMetrics, serde_json::Error> {
        serde_json::from_value(self.metrics.clone())
    }

    /// Snapshot used by scoring passes.
    pub fn to_active(&self) -> Result<ActiveModel, serde_json::Error> {
        Ok(ActiveModel {
            model_version: self.model_version,
            parameters: self.parameters()?,
        })
    }
}
