use leadq_core::outcome::{OutcomeLabel, OutcomeRecord};
use leadq_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `lead_outcomes` table (append-only).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LeadOutcome {
    pub id: DbId,
    pub organization_id: DbId,
    pub lead_id: DbId,
    pub outcome: String,
    pub notes: Option<String>,
    pub recorded_at: Timestamp,
}

/// DTO for recording a human-confirmed outcome.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOutcome {
    pub outcome: OutcomeLabel,
    pub notes: Option<String>,
}

impl LeadOutcome {
    /// `None` for labels the database check should have rejected.
    pub fn to_record(&self) -> Option<OutcomeRecord> {
        let label = self.outcome.parse().ok()?;
        Some(OutcomeRecord {
            id: self.id,
            lead_id: self.lead_id,
            label,
            recorded_at: self.recorded_at,
        })
    }
}
