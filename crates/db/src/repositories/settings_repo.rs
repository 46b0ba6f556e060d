//! Repository for the `organization_scoring_settings` table.

use sqlx::PgPool;
use leadq_core::types::DbId;

use crate::models::settings::{OrganizationScoringSettings, UpsertScoringSettings};

const COLUMNS: &str = "\
    organization_id, hot_threshold, warm_threshold, blend_policy, model_weight, \
    created_at, updated_at";

pub struct ScoringSettingsRepo;

impl ScoringSettingsRepo {
    /// `None` means the organization uses the defaults.
    pub async fn find(
        pool: &PgPool,
        organization_id: DbId,
    ) -> Result<Option<OrganizationScoringSettings>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM organization_scoring_settings WHERE organization_id = $1"
        );
        sqlx::query_as::<_, OrganizationScoringSettings>(&query)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn upsert(
        pool: &PgPool,
        organization_id: DbId,
        input: &UpsertScoringSettings,
    ) -> Result<OrganizationScoringSettings, sqlx::Error> {
        let query = format!(
            "INSERT INTO organization_scoring_settings \
                 (organization_id, hot_threshold, warm_threshold, blend_policy, model_weight) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (organization_id) DO UPDATE SET \
                 hot_threshold = EXCLUDED.hot_threshold, \
                 warm_threshold = EXCLUDED.warm_threshold, \
                 blend_policy = EXCLUDED.blend_policy, \
                 model_weight = EXCLUDED.model_weight \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OrganizationScoringSettings>(&query)
            .bind(organization_id)
            .bind(input.hot_threshold)
            .bind(input.warm_threshold)
            .bind(input.blend_policy.as_str())
            .bind(input.model_weight)
            .fetch_one(pool)
            .await
    }
}
