//! Repository for the `leads` table.

use sqlx::PgPool;
use leadq_core::types::DbId;

use crate::models::lead::{CreateLead, Lead};

pub(crate) const COLUMNS: &str = "\
    id, organization_id, company_name, company_size, industry, budget, \
    timeline, job_title, custom_fields, qualification_score, \
    qualification_label, qualified_at, created_at, updated_at";

pub struct LeadRepo;

impl LeadRepo {
    pub async fn create(
        pool: &PgPool,
        organization_id: DbId,
        input: &CreateLead,
    ) -> Result<Lead, sqlx::Error> {
        let query = format!(
            "INSERT INTO leads \
                 (organization_id, company_name, company_size, industry, budget, \
                  timeline, job_title, custom_fields) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Lead>(&query)
            .bind(organization_id)
            .bind(&input.company_name)
            .bind(&input.company_size)
            .bind(&input.industry)
            .bind(&input.budget)
            .bind(&input.timeline)
            .bind(&input.job_title)
            .bind(serde_json::json!(input.custom_fields))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<Lead>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM leads WHERE id = $1 AND organization_id = $2"
        );
        sqlx::query_as::<_, Lead>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Leads of one organization by id, ordered by id.
    pub async fn list_by_ids(
        pool: &PgPool,
        organization_id: DbId,
        ids: &[DbId],
    ) -> Result<Vec<Lead>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM leads \
             WHERE organization_id = $1 AND id = ANY($2) \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, Lead>(&query)
            .bind(organization_id)
            .bind(ids)
            .fetch_all(pool)
            .await
    }
}
