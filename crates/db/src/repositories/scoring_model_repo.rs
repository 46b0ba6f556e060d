//! Repository for the `scoring_models` table.
//!
//! Activation demotes the previous active version and promotes the new one
//! in a single transaction; the partial unique index
//! `uq_scoring_models_one_active` guarantees at most one active row.

use sqlx::PgPool;
use leadq_core::types::DbId;

use crate::models::scoring_model::ScoringModel;

const COLUMNS: &str = "\
    id, organization_id, model_version, state, algorithm, parameters, metrics, \
    trained_on_count, activated_at, superseded_at, created_at";

/// Fields of a freshly trained version.
#[derive(Debug, Clone)]
pub struct NewScoringModel<'a> {
    pub algorithm: &'a str,
    pub parameters: &'a serde_json::Value,
    pub metrics: &'a serde_json::Value,
    pub trained_on_count: i32,
}

pub struct ScoringModelRepo;

impl ScoringModelRepo {
    /// Store a trained version under the next version number, optionally
    /// activating it in the same transaction.
    pub async fn insert(
        pool: &PgPool,
        organization_id: DbId,
        model: &NewScoringModel<'_>,
        activate: bool,
    ) -> Result<ScoringModel, sqlx::Error> {
        let mut tx = pool.begin().await?;

        // Serialize version allocation per organization.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(organization_id)
            .execute(&mut *tx)
            .await?;

        let next_version: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(model_version), 0) + 1 FROM scoring_models \
             WHERE organization_id = $1",
        )
        .bind(organization_id)
        .fetch_one(&mut *tx)
        .await?;

        if activate {
            Self::demote_active(&mut tx, organization_id).await?;
        }

        let query = format!(
            "INSERT INTO scoring_models \
                 (organization_id, model_version, state, algorithm, parameters, metrics, \
                  trained_on_count, activated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, CASE WHEN $8 THEN NOW() END) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, ScoringModel>(&query)
            .bind(organization_id)
            .bind(next_version)
            .bind(if activate { "active" } else { "trained" })
            .bind(model.algorithm)
            .bind(model.parameters)
            .bind(model.metrics)
            .bind(model.trained_on_count)
            .bind(activate)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }

    /// Promote a `trained` version to active, superseding the current one.
    ///
    /// Returns `None` (and changes nothing) unless the version exists in the
    /// `trained` state.
    pub async fn activate(
        pool: &PgPool,
        organization_id: DbId,
        model_version: i32,
    ) -> Result<Option<ScoringModel>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let target: Option<(String,)> = sqlx::query_as(
            "SELECT state FROM scoring_models \
             WHERE organization_id = $1 AND model_version = $2 \
             FOR UPDATE",
        )
        .bind(organization_id)
        .bind(model_version)
        .fetch_optional(&mut *tx)
        .await?;

        if !matches!(target, Some((ref state,)) if state == "trained") {
            return Ok(None);
        }

        Self::demote_active(&mut tx, organization_id).await?;

        let query = format!(
            "UPDATE scoring_models SET state = 'active', activated_at = NOW() \
             WHERE organization_id = $1 AND model_version = $2 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, ScoringModel>(&query)
            .bind(organization_id)
            .bind(model_version)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(row))
    }

    async fn demote_active(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        organization_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE scoring_models SET state = 'superseded', superseded_at = NOW() \
             WHERE organization_id = $1 AND state = 'active'",
        )
        .bind(organization_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn find_active(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<Option<ScoringModel>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM scoring_models \
             WHERE organization_id = $1 AND state = 'active'"
        );
        sqlx::query_as::<_, ScoringModel>(&query)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_version(
        pool: &PgPool,
        organization_id: DbId,
        model_version: i32,
    ) -> Result<Option<ScoringModel>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM scoring_models \
             WHERE organization_id = $1 AND model_version = $2"
        );
        sqlx::query_as::<_, ScoringModel>(&query)
            .bind(organization_id)
            .bind(model_version)
            .fetch_optional(pool)
            .await
    }

    /// All versions of an organization, newest first.
    pub async fn list(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<Vec<ScoringModel>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM scoring_models \
             WHERE organization_id = $1 \
             ORDER BY model_version DESC"
        );
        sqlx::query_as::<_, ScoringModel>(&query)
            .bind(organization_id)
            .fetch_all(pool)
            .await
    }

    pub async fn exists_for_org(pool: &PgPool, organization_id: DbId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM scoring_models WHERE organization_id = $1)")
            .bind(organization_id)
            .fetch_one(pool)
            .await
    }
}
