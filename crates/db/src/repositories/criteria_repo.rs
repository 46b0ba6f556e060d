//! Repository for the `icp_criteria` table.

use sqlx::PgPool;
use leadq_core::types::DbId;

use crate::models::criterion::{CreateCriterion, IcpCriterionRow};

const COLUMNS: &str = "\
    id, organization_id, name, data_type, weight, ideal_values, position, \
    created_at, updated_at";

pub struct CriteriaRepo;

impl CriteriaRepo {
    /// Insert a criterion. `weight` is the already-converted internal weight.
    pub async fn create(
        pool: &PgPool,
        organization_id: DbId,
        input: &CreateCriterion,
        weight: i16,
    ) -> Result<IcpCriterionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO icp_criteria \
                 (organization_id, name, data_type, weight, ideal_values, position) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, IcpCriterionRow>(&query)
            .bind(organization_id)
            .bind(input.name.trim())
            .bind(input.data_type.as_str())
            .bind(weight)
            .bind(serde_json::json!(input.ideal_values))
            .bind(input.position.unwrap_or(0))
            .fetch_one(pool)
            .await
    }

    /// All criteria of an organization in evaluation order.
    pub async fn list_for_org(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<Vec<IcpCriterionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM icp_criteria \
             WHERE organization_id = $1 \
             ORDER BY position ASC, id ASC"
        );
        sqlx::query_as::<_, IcpCriterionRow>(&query)
            .bind(organization_id)
            .fetch_all(pool)
            .await
    }
}
