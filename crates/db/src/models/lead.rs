use std::collections::BTreeMap;

use leadq_core::features::{Enrichment, LeadProfile};
use leadq_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `leads` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Lead {
    pub id: DbId,
    pub organization_id: DbId,
    pub company_name: Option<String>,
    pub company_size: Option<String>,
    pub industry: Option<String>,
    pub budget: Option<String>,
    pub timeline: Option<String>,
    pub job_title: Option<String>,
    pub custom_fields: serde_json::Value,
    pub qualification_score: Option<f64>,
    pub qualification_label: Option<String>,
    pub qualified_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a lead.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateLead {
    pub company_name: Option<String>,
    pub company_size: Option<String>,
    pub industry: Option<String>,
    pub budget: Option<String>,
    pub timeline: Option<String>,
    pub job_title: Option<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
}

impl Lead {
    /// The lead attributes as the feature extractor sees them.
    ///
    /// Non-string custom field values are rendered as JSON text; nulls are
    /// dropped.
    pub fn profile(&self) -> LeadProfile {
        LeadProfile {
            company_name: self.company_name.clone(),
            company_size: self.company_size.clone(),
            industry: self.industry.clone(),
            budget: self.budget.clone(),
            timeline: self.timeline.clone(),
            job_title: self.job_title.clone(),
            custom_fields: json_object_to_strings(&self.custom_fields),
        }
    }
}

/// A row from the `lead_enrichments` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LeadEnrichment {
    pub lead_id: DbId,
    pub fields: serde_json::Value,
    pub confidence: Option<f64>,
    pub source: Option<String>,
    pub fetched_at: Timestamp,
}

impl LeadEnrichment {
    pub fn to_domain(&self) -> Enrichment {
        Enrichment {
            fields: json_object_to_strings(&self.fields),
            confidence: self.confidence.unwrap_or(0.0),
            source: self.source.clone().unwrap_or_default(),
        }
    }
}

fn json_object_to_strings(value: &serde_json::Value) -> BTreeMap<String, String> {
    let Some(map) = value.as_object() else {
        return BTreeMap::new();
    };
    map.iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((k.clone(), s.clone())),
            other => Some((k.clone(), other.to_string())),
        })
        .collect()
}
