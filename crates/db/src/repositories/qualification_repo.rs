//! Repository for `qualification_results` and the lead's current
//! qualification columns.

use sqlx::PgPool;
use leadq_core::blend::QualificationResult;
use leadq_core::types::DbId;

use crate::models::qualification::QualificationResultRow;

const COLUMNS: &str = "\
    id, organization_id, lead_id, score, label, reasoning, breakdown, \
    recommended_action, rule_score, model_score, model_version, degraded, \
    blend_policy, created_at";

/// Result of persisting one qualification.
#[derive(Debug, Clone)]
pub struct RecordedQualification {
    pub row: QualificationResultRow,
    /// The lead's label before this result replaced it.
    pub previous_label: Option<String>,
}

pub struct QualificationRepo;

impl QualificationRepo {
    /// Append a result and make it the lead's current qualification.
    ///
    /// Locks the lead row so concurrent qualifications of the same lead
    /// observe each other's labels in order. Returns `None` if the lead does
    /// not belong to the organization.
    pub async fn record(
        pool: &PgPool,
        organization_id: DbId,
        lead_id: DbId,
        result: &QualificationResult,
    ) -> Result<Option<RecordedQualification>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let previous: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT qualification_label FROM leads \
             WHERE id = $1 AND organization_id = $2 \
             FOR UPDATE",
        )
        .bind(lead_id)
        .bind(organization_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((previous_label,)) = previous else {
            return Ok(None);
        };

        let breakdown = serde_json::to_value(&result.breakdown)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let query = format!(
            "INSERT INTO qualification_results \
                 (organization_id, lead_id, score, label, reasoning, breakdown, \
                  recommended_action, rule_score, model_score, model_version, \
                  degraded, blend_policy) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, QualificationResultRow>(&query)
            .bind(organization_id)
            .bind(lead_id)
            .bind(result.score)
            .bind(result.label.as_str())
            .bind(&result.reasoning)
            .bind(&breakdown)
            .bind(&result.recommended_action)
            .bind(result.rule_score)
            .bind(result.model_score)
            .bind(result.model_version)
            .bind(result.degraded)
            .bind(&result.blend_policy)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE leads SET \
                 qualification_score = $2, \
                 qualification_label = $3, \
                 qualified_at = $4 \
             WHERE id = $1",
        )
        .bind(lead_id)
        .bind(row.score)
        .bind(&row.label)
        .bind(row.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(RecordedQualification {
            row,
            previous_label,
        }))
    }

    /// Qualification history of a lead, newest first.
    pub async fn list_for_lead(
        pool: &PgPool,
        organization_id: DbId,
        lead_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<QualificationResultRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM qualification_results \
             WHERE organization_id = $1 AND lead_id = $2 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, QualificationResultRow>(&query)
            .bind(organization_id)
            .bind(lead_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}
