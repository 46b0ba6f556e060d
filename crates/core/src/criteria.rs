//! ICP criteria: data types, weight scale conversion, and validation.
//!
//! Weights are stored internally on a 1..=10 integer scale and expressed
//! externally as a 0..=100 percentage. Weights need not sum to 100; the rule
//! scorer normalizes by the total.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::ScoringError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Smallest internal weight.
pub const MIN_INTERNAL_WEIGHT: i16 = 1;

/// Largest internal weight.
pub const MAX_INTERNAL_WEIGHT: i16 = 10;

/// Largest external (percentage) weight.
pub const MAX_EXTERNAL_WEIGHT: i32 = 100;

const MAX_NAME_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Data type
// ---------------------------------------------------------------------------

/// What kind of lead attribute a criterion evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionDataType {
    CompanySize,
    Industry,
    Budget,
    Timeline,
    JobTitle,
    Custom,
}

impl CriterionDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompanySize => "company_size",
            Self::Industry => "industry",
            Self::Budget => "budget",
            Self::Timeline => "timeline",
            Self::JobTitle => "job_title",
            Self::Custom => "custom",
        }
    }

    /// Whether ideal values of this type describe numeric ranges and should
    /// be matched with the graduated distance function.
    pub fn is_ranged(&self) -> bool {
        matches!(self, Self::CompanySize | Self::Budget | Self::Timeline)
    }
}

impl fmt::Display for CriterionDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CriterionDataType {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "company_size" => Ok(Self::CompanySize),
            "industry" => Ok(Self::Industry),
            "budget" => Ok(Self::Budget),
            "timeline" => Ok(Self::Timeline),
            "job_title" => Ok(Self::JobTitle),
            "custom" => Ok(Self::Custom),
            other => Err(ScoringError::InvalidCriterion {
                name: other.to_string(),
                reason: "unknown data type".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Criterion
// ---------------------------------------------------------------------------

/// One organization-defined ICP criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcpCriterion {
    pub id: DbId,
    pub name: String,
    pub data_type: CriterionDataType,
    /// Internal 1..=10 weight.
    pub weight: i16,
    pub ideal_values: IndexSet<String>,
}

impl IcpCriterion {
    /// Build a criterion from raw storage values, de-duplicating ideal values
    /// while preserving their first-seen order.
    pub fn new(
        id: DbId,
        name: impl Into<String>,
        data_type: CriterionDataType,
        weight: i16,
        ideal_values: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            data_type,
            weight,
            ideal_values: ideal_values
                .into_iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect(),
        }
    }

    /// Weight as the externally visible percentage.
    pub fn external_weight(&self) -> i32 {
        weight_to_external(self.weight)
    }
}

// ---------------------------------------------------------------------------
// Weight conversion
// ---------------------------------------------------------------------------

/// Convert an internal 1..=10 weight to the external percentage scale.
pub fn weight_to_external(internal: i16) -> i32 {
    i32::from(internal) * 10
}

/// Convert an external percentage to the internal scale:
/// `clamp(round(external / 10), 1, 10)`, rounding halves away from zero.
///
/// Rejects values outside `0..=100`.
pub fn weight_from_external(external: i32) -> Result<i16, ScoringError> {
    if !(0..=MAX_EXTERNAL_WEIGHT).contains(&external) {
        return Err(ScoringError::InvalidWeight(external));
    }
    let rounded = (external + 5) / 10;
    Ok((rounded as i16).clamp(MIN_INTERNAL_WEIGHT, MAX_INTERNAL_WEIGHT))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate one criterion as loaded from the criteria store.
pub fn validate_criterion(criterion: &IcpCriterion) -> Result<(), ScoringError> {
    let name = criterion.name.trim();
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(ScoringError::InvalidCriterion {
            name: criterion.name.clone(),
            reason: format!("name must be 1..={MAX_NAME_LEN} characters"),
        });
    }
    if !(MIN_INTERNAL_WEIGHT..=MAX_INTERNAL_WEIGHT).contains(&criterion.weight) {
        return Err(ScoringError::InvalidWeight(i32::from(criterion.weight)));
    }
    if criterion.ideal_values.is_empty() {
        return Err(ScoringError::InvalidCriterion {
            name: criterion.name.clone(),
            reason: "at least one ideal value is required".to_string(),
        });
    }
    Ok(())
}

/// Validate a full criteria set. An empty set is rejected with
/// [`ScoringError::NoCriteria`].
pub fn validate_criteria(criteria: &[IcpCriterion]) -> Result<(), ScoringError> {
    if criteria.is_empty() {
        return Err(ScoringError::NoCriteria);
    }
    criteria.iter().try_for_each(validate_criterion)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(weight: i16, ideal: &[&str]) -> IcpCriterion {
        IcpCriterion::new(
            1,
            "Budget",
            CriterionDataType::Budget,
            weight,
            ideal.iter().map(|s| s.to_string()),
        )
    }

    #[test]
    fn external_to_internal_rounds_and_clamps() {
        assert_eq!(weight_from_external(0).unwrap(), 1);
        assert_eq!(weight_from_external(4).unwrap(), 1);
        assert_eq!(weight_from_external(15).unwrap(), 2);
        assert_eq!(weight_from_external(44).unwrap(), 4);
        assert_eq!(weight_from_external(45).unwrap(), 5);
        assert_eq!(weight_from_external(80).unwrap(), 8);
        assert_eq!(weight_from_external(100).unwrap(), 10);
    }

    #[test]
    fn conversion_matches_formula_for_full_range() {
        for w in 0..=100 {
            let expected = ((f64::from(w) / 10.0).round() as i16).clamp(1, 10);
            assert_eq!(weight_from_external(w).unwrap(), expected, "w = {w}");
        }
    }

    #[test]
    fn internal_round_trips_through_external() {
        for internal in MIN_INTERNAL_WEIGHT..=MAX_INTERNAL_WEIGHT {
            let external = weight_to_external(internal);
            assert_eq!(weight_from_external(external).unwrap(), internal);
        }
    }

    #[test]
    fn out_of_range_external_weight_rejected() {
        assert_eq!(weight_from_external(-1), Err(ScoringError::InvalidWeight(-1)));
        assert_eq!(weight_from_external(101), Err(ScoringError::InvalidWeight(101)));
    }

    #[test]
    fn ideal_values_are_deduplicated_in_order() {
        let c = criterion(5, &["SaaS", " Fintech ", "SaaS", ""]);
        let values: Vec<&str> = c.ideal_values.iter().map(String::as_str).collect();
        assert_eq!(values, vec!["SaaS", "Fintech"]);
    }

    #[test]
    fn data_type_parses_round_trip() {
        for dt in [
            CriterionDataType::CompanySize,
            CriterionDataType::Industry,
            CriterionDataType::Budget,
            CriterionDataType::Timeline,
            CriterionDataType::JobTitle,
            CriterionDataType::Custom,
        ] {
            assert_eq!(dt.as_str().parse::<CriterionDataType>().unwrap(), dt);
        }
        assert!("revenue".parse::<CriterionDataType>().is_err());
    }

    #[test]
    fn empty_criteria_set_is_no_criteria() {
        assert_eq!(validate_criteria(&[]), Err(ScoringError::NoCriteria));
    }

    #[test]
    fn criterion_without_ideal_values_rejected() {
        let c = criterion(5, &[]);
        assert!(matches!(
            validate_criterion(&c),
            Err(ScoringError::InvalidCriterion { .. })
        ));
    }

    #[test]
    fn criterion_with_bad_internal_weight_rejected() {
        let c = criterion(11, &["$50k+"]);
        assert_eq!(validate_criterion(&c), Err(ScoringError::InvalidWeight(11)));
    }
}
