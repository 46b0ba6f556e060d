use leadq_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `qualification_results` table. Append-only history of
/// every scoring invocation.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QualificationResultRow {
    pub id: DbId,
    pub organization_id: DbId,
    pub lead_id: DbId,
    pub score: f64,
    pub label: String,
    pub reasoning: String,
    pub breakdown: serde_json::Value,
    pub recommended_action: String,
    pub rule_score: f64,
    pub model_score: Option<f64>,
    pub model_version: Option<i32>,
    pub degraded: bool,
    pub blend_policy: String,
    pub created_at: Timestamp,
}
