//! Repository for the append-only `lead_outcomes` table.

use sqlx::PgPool;
use leadq_core::types::DbId;

use crate::models::outcome::{CreateOutcome, LeadOutcome};

const COLUMNS: &str = "id, organization_id, lead_id, outcome, notes, recorded_at";

pub struct OutcomeRepo;

impl OutcomeRepo {
    /// Append an outcome. Earlier outcomes for the lead stay in history.
    pub async fn create(
        pool: &PgPool,
        organization_id: DbId,
        lead_id: DbId,
        input: &CreateOutcome,
    ) -> Result<LeadOutcome, sqlx::Error> {
        let query = format!(
            "INSERT INTO lead_outcomes (organization_id, lead_id, outcome, notes) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LeadOutcome>(&query)
            .bind(organization_id)
            .bind(lead_id)
            .bind(input.outcome.as_str())
            .bind(&input.notes)
            .fetch_one(pool)
            .await
    }

    /// Every outcome of an organization ordered by lead, then time.
    pub async fn list_for_org(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<Vec<LeadOutcome>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM lead_outcomes \
             WHERE organization_id = $1 \
             ORDER BY lead_id ASC, recorded_at ASC, id ASC"
        );
        sqlx::query_as::<_, LeadOutcome>(&query)
            .bind(organization_id)
            .fetch_all(pool)
            .await
    }

    /// Number of leads with at least one outcome. Corrections of an already
    /// labeled lead do not increase it.
    pub async fn count_labeled_leads(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(DISTINCT lead_id) FROM lead_outcomes WHERE organization_id = $1",
        )
        .bind(organization_id)
        .fetch_one(pool)
        .await
    }
}
