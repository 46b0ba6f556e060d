use leadq_core::criteria::{CriterionDataType, IcpCriterion};
use leadq_core::error::ScoringError;
use leadq_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `icp_criteria` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct IcpCriterionRow {
    pub id: DbId,
    pub organization_id: DbId,
    pub name: String,
    pub data_type: String,
    /// Internal 1..=10 weight.
    pub weight: i16,
    pub ideal_values: serde_json::Value,
    pub position: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a criterion. `weight` is on the external 0..=100 scale.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCriterion {
    pub name: String,
    pub data_type: CriterionDataType,
    pub weight: i32,
    pub ideal_values: Vec<String>,
    pub position: Option<i32>,
}

impl IcpCriterionRow {
    /// Convert to the domain type, rejecting unknown data types and
    /// malformed `ideal_values`.
    pub fn to_domain(&self) -> Result<IcpCriterion, ScoringError> {
        let data_type: CriterionDataType =
            self.data_type
                .parse()
                .map_err(|_| ScoringError::InvalidCriterion {
                    name: self.name.clone(),
                    reason: format!("unknown data type '{}'", self.data_type),
                })?;
        let ideal_values: Vec<String> = serde_json::from_value(self.ideal_values.clone())
            .map_err(|e| ScoringError::InvalidCriterion {
                name: self.name.clone(),
                reason: format!("ideal_values must be an array of strings: {e}"),
            })?;
        Ok(IcpCriterion::new(
            self.id,
            self.name.clone(),
            data_type,
            self.weight,
            ideal_values,
        ))
    }
}
