//! Repository for the `lead_enrichments` cache.
//!
//! Enrichment is fetched by an external service; this table only caches the
//! latest result per lead.

use std::collections::BTreeMap;

use sqlx::PgPool;
use leadq_core::types::DbId;

use crate::models::lead::LeadEnrichment;

const COLUMNS: &str = "lead_id, fields, confidence, source, fetched_at";

pub struct EnrichmentRepo;

impl EnrichmentRepo {
    /// Replace the cached enrichment of a lead.
    pub async fn upsert(
        pool: &PgPool,
        lead_id: DbId,
        fields: &BTreeMap<String, String>,
        confidence: f64,
        source: &str,
    ) -> Result<LeadEnrichment, sqlx::Error> {
        let query = format!(
            "INSERT INTO lead_enrichments (lead_id, fields, confidence, source) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (lead_id) DO UPDATE SET \
                 fields = EXCLUDED.fields, \
                 confidence = EXCLUDED.confidence, \
                 source = EXCLUDED.source, \
                 fetched_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LeadEnrichment>(&query)
            .bind(lead_id)
            .bind(serde_json::json!(fields))
            .bind(confidence)
            .bind(source)
            .fetch_one(pool)
            .await
    }

    pub async fn find_for_lead(
        pool: &PgPool,
        lead_id: DbId,
    ) -> Result<Option<LeadEnrichment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM lead_enrichments WHERE lead_id = $1");
        sqlx::query_as::<_, LeadEnrichment>(&query)
            .bind(lead_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_leads(
        pool: &PgPool,
        lead_ids: &[DbId],
    ) -> Result<Vec<LeadEnrichment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM lead_enrichments WHERE lead_id = ANY($1)");
        sqlx::query_as::<_, LeadEnrichment>(&query)
            .bind(lead_ids)
            .fetch_all(pool)
            .await
    }
}
