//! Deterministic weighted rule scorer and label thresholds.
//!
//! `score = 100 * Σ(weight_i * match_i) / Σ(weight_i)` where each `match_i`
//! is in `[0, 1]`. Identical inputs always produce bit-identical output:
//! criteria are evaluated in their given order and no state is kept.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::criteria::{CriterionDataType, IcpCriterion};
use crate::error::ScoringError;
use crate::features::{
    parse_amount_range, parse_timeline_months, FeatureVector, NumericRange, FIELD_BUDGET,
    FIELD_COMPANY_SIZE, FIELD_INDUSTRY, FIELD_JOB_TITLE, FIELD_TIMELINE,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default cut point for the `hot` label.
pub const DEFAULT_HOT_THRESHOLD: f64 = 70.0;

/// Default cut point for the `warm` label.
pub const DEFAULT_WARM_THRESHOLD: f64 = 40.0;

/// Default relative distance at which a ranged match decays to zero.
pub const DEFAULT_NUMERIC_TOLERANCE: f64 = 0.5;

/// Per-criterion scores at or above this count as a strong fit in notes.
const STRONG_MATCH: f64 = 0.999;

// ---------------------------------------------------------------------------
// Labels and thresholds
// ---------------------------------------------------------------------------

/// Qualification label, ordered `Cold < Warm < Hot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Cold,
    Warm,
    Hot,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Warm => "warm",
            Self::Hot => "hot",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cold" => Ok(Self::Cold),
            "warm" => Ok(Self::Warm),
            "hot" => Ok(Self::Hot),
            other => Err(format!("unknown label '{other}'")),
        }
    }
}

/// Ordered label cut points. Construct via [`LabelThresholds::new`], which
/// rejects non-monotonic configurations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelThresholds {
    hot: f64,
    warm: f64,
}

impl LabelThresholds {
    pub fn new(hot: f64, warm: f64) -> Result<Self, ScoringError> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(hot) || !in_range(warm) || warm >= hot {
            return Err(ScoringError::NonMonotonicThresholds { warm, hot });
        }
        Ok(Self { hot, warm })
    }

    pub fn hot(&self) -> f64 {
        self.hot
    }

    pub fn warm(&self) -> f64 {
        self.warm
    }

    pub fn label_for(&self, score: f64) -> Label {
        if score >= self.hot {
            Label::Hot
        } else if score >= self.warm {
            Label::Warm
        } else {
            Label::Cold
        }
    }
}

impl Default for LabelThresholds {
    fn default() -> Self {
        Self {
            hot: DEFAULT_HOT_THRESHOLD,
            warm: DEFAULT_WARM_THRESHOLD,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    /// Relative distance (gap / ideal magnitude) at which a ranged match
    /// reaches zero.
    pub numeric_tolerance: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            numeric_tolerance: DEFAULT_NUMERIC_TOLERANCE,
        }
    }
}

// ---------------------------------------------------------------------------
// Breakdown
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Match,
    Partial,
    Miss,
    /// No data for this criterion. Scores 0 but is not a poor fit.
    Unknown,
}

/// One criterion's contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    /// Match score in `[0, 1]`.
    pub score: f64,
    pub weight: i16,
    pub status: MatchStatus,
    pub note: String,
}

/// Rule scorer output. `breakdown` keeps criteria order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleScore {
    /// Aggregate in `[0, 100]`.
    pub score: f64,
    pub breakdown: IndexMap<String, CriterionScore>,
}

impl RuleScore {
    pub fn unknown_criteria(&self) -> impl Iterator<Item = &str> {
        self.breakdown
            .iter()
            .filter(|(_, c)| c.status == MatchStatus::Unknown)
            .map(|(name, _)| name.as_str())
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Score a feature vector against ICP criteria.
///
/// Fails with [`ScoringError::NoCriteria`] when the total weight is zero.
pub fn score(
    criteria: &[IcpCriterion],
    features: &FeatureVector,
    config: &ScoringConfig,
) -> Result<RuleScore, ScoringError> {
    let total_weight: f64 = criteria
        .iter()
        .map(|c| f64::from(c.weight.max(0)))
        .sum();
    if total_weight <= 0.0 {
        return Err(ScoringError::NoCriteria);
    }

    let mut breakdown = IndexMap::with_capacity(criteria.len());
    let mut weighted = 0.0;

    for criterion in criteria {
        let evaluated = evaluate_criterion(criterion, features, config);
        weighted += f64::from(criterion.weight.max(0)) * evaluated.score;
        breakdown.insert(criterion.name.clone(), evaluated);
    }

    let aggregate = (100.0 * weighted / total_weight).clamp(0.0, 100.0);
    Ok(RuleScore {
        score: round2(aggregate),
        breakdown,
    })
}

/// Round to two decimals so persisted scores compare exactly.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn lead_value<'a>(criterion: &IcpCriterion, features: &'a FeatureVector) -> Option<&'a str> {
    match criterion.data_type {
        CriterionDataType::CompanySize => features.raw(FIELD_COMPANY_SIZE),
        CriterionDataType::Industry => features.raw(FIELD_INDUSTRY),
        CriterionDataType::Budget => features.raw(FIELD_BUDGET),
        CriterionDataType::Timeline => features.raw(FIELD_TIMELINE),
        CriterionDataType::JobTitle => features.raw(FIELD_JOB_TITLE),
        CriterionDataType::Custom => features.raw_custom(&criterion.name),
    }
}

fn evaluate_criterion(
    criterion: &IcpCriterion,
    features: &FeatureVector,
    config: &ScoringConfig,
) -> CriterionScore {
    let weight = criterion.weight;
    let Some(value) = lead_value(criterion, features) else {
        return CriterionScore {
            score: 0.0,
            weight,
            status: MatchStatus::Unknown,
            note: format!("Unknown: no {} data available", criterion.data_type),
        };
    };

    let (score, matched) = if criterion.data_type.is_ranged() {
        ranged_match(criterion, value, config)
    } else {
        categorical_match(criterion, value)
    };

    let (status, note) = if score >= STRONG_MATCH {
        let ideal = matched.unwrap_or_default();
        (MatchStatus::Match, format!("'{value}' matches ideal '{ideal}'"))
    } else if score > 0.0 {
        let ideal = matched.unwrap_or_default();
        (
            MatchStatus::Partial,
            format!("'{value}' is close to ideal '{ideal}' ({:.0}%)", score * 100.0),
        )
    } else {
        (
            MatchStatus::Miss,
            format!("'{value}' does not match any ideal value"),
        )
    };

    CriterionScore {
        score: round2(score),
        weight,
        status,
        note,
    }
}

/// Exact or containment match, case-insensitive. Returns the matched ideal.
fn categorical_match<'a>(criterion: &'a IcpCriterion, value: &str) -> (f64, Option<&'a str>) {
    let lower = value.to_lowercase();
    let hit = criterion.ideal_values.iter().find(|ideal| {
        let ideal_lower = ideal.to_lowercase();
        lower == ideal_lower || lower.contains(&ideal_lower)
    });
    match hit {
        Some(ideal) => (1.0, Some(ideal.as_str())),
        None => (0.0, None),
    }
}

/// Graduated distance-to-ideal match. The best ideal value wins; ties keep
/// the first ideal in criterion order.
fn ranged_match<'a>(
    criterion: &'a IcpCriterion,
    value: &str,
    config: &ScoringConfig,
) -> (f64, Option<&'a str>) {
    let parse = |text: &str| match criterion.data_type {
        CriterionDataType::Timeline => parse_timeline_months(text),
        _ => parse_amount_range(text),
    };

    let Some(lead_range) = parse(value) else {
        return categorical_match(criterion, value);
    };

    let mut best: (f64, Option<&str>) = (0.0, None);
    for ideal in &criterion.ideal_values {
        let candidate = if ideal.eq_ignore_ascii_case(value) {
            1.0
        } else {
            match parse(ideal) {
                Some(ideal_range) => range_score(&lead_range, &ideal_range, config.numeric_tolerance),
                None => categorical_match_one(ideal, value),
            }
        };
        if candidate > best.0 {
            best = (candidate, Some(ideal.as_str()));
        }
    }
    best
}

fn categorical_match_one(ideal: &str, value: &str) -> f64 {
    if ideal.eq_ignore_ascii_case(value) {
        1.0
    } else {
        0.0
    }
}

/// 1.0 when the ranges overlap, decaying linearly to 0.0 once the relative
/// gap reaches `tolerance`.
fn range_score(lead: &NumericRange, ideal: &NumericRange, tolerance: f64) -> f64 {
    let gap = lead.gap(ideal);
    if gap == 0.0 {
        return 1.0;
    }
    if tolerance <= 0.0 {
        return 0.0;
    }
    let nearest_edge = if lead.max < ideal.min { ideal.min } else { ideal.max };
    let scale = nearest_edge.abs().max(1.0);
    (1.0 - (gap / scale) / tolerance).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::criteria::weight_from_external;
    use crate::features::{extract, LeadProfile};

    fn criterion(id: i64, name: &str, dt: CriterionDataType, external: i32, ideal: &[&str]) -> IcpCriterion {
        IcpCriterion::new(
            id,
            name,
            dt,
            weight_from_external(external).unwrap(),
            ideal.iter().map(|s| s.to_string()),
        )
    }

    fn example_criteria() -> Vec<IcpCriterion> {
        vec![
            criterion(1, "Budget", CriterionDataType::Budget, 80, &["$50k+"]),
            criterion(2, "Industry", CriterionDataType::Industry, 20, &["SaaS"]),
        ]
    }

    fn features(budget: &str, industry: &str) -> FeatureVector {
        extract(
            &LeadProfile {
                budget: Some(budget.into()),
                industry: Some(industry.into()),
                ..Default::default()
            },
            None,
        )
        .unwrap()
    }

    #[test]
    fn full_match_scores_100_and_is_hot() {
        let result = score(&example_criteria(), &features("$50k+", "SaaS"), &ScoringConfig::default()).unwrap();
        assert_eq!(result.score, 100.0);
        assert_eq!(LabelThresholds::default().label_for(result.score), Label::Hot);
    }

    #[test]
    fn industry_miss_scores_80_and_stays_hot() {
        let result = score(&example_criteria(), &features("$50k+", "Retail"), &ScoringConfig::default()).unwrap();
        assert_eq!(result.score, 80.0);
        assert_eq!(result.breakdown["Industry"].status, MatchStatus::Miss);
        assert_eq!(LabelThresholds::default().label_for(result.score), Label::Hot);
    }

    #[test]
    fn missing_data_is_unknown_not_poor() {
        let fv = extract(
            &LeadProfile {
                industry: Some("SaaS".into()),
                ..Default::default()
            },
            None,
        )
        .unwrap();
        let result = score(&example_criteria(), &fv, &ScoringConfig::default()).unwrap();
        assert_eq!(result.score, 20.0);
        let budget = &result.breakdown["Budget"];
        assert_eq!(budget.status, MatchStatus::Unknown);
        assert!(budget.note.starts_with("Unknown"));
        assert_eq!(result.unknown_criteria().collect::<Vec<_>>(), vec!["Budget"]);
    }

    #[test]
    fn no_criteria_is_an_error() {
        let result = score(&[], &features("$50k+", "SaaS"), &ScoringConfig::default());
        assert_eq!(result, Err(ScoringError::NoCriteria));
    }

    #[test]
    fn ranged_match_decays_with_distance() {
        let criteria = vec![criterion(1, "Budget", CriterionDataType::Budget, 100, &["$50k-$100k"])];
        let config = ScoringConfig::default();

        let near = score(&criteria, &features("$40k", "x"), &config).unwrap();
        let far = score(&criteria, &features("$10k", "x"), &config).unwrap();
        let inside = score(&criteria, &features("$75k", "x"), &config).unwrap();

        assert_eq!(inside.score, 100.0);
        // gap 10k over a 50k edge = 0.2 relative; 1 - 0.2/0.5 = 0.6
        assert_eq!(near.score, 60.0);
        assert_eq!(near.breakdown["Budget"].status, MatchStatus::Partial);
        assert_eq!(far.score, 0.0);
    }

    #[test]
    fn best_ideal_value_wins() {
        let criteria = vec![criterion(
            1,
            "Size",
            CriterionDataType::CompanySize,
            50,
            &["1001-5000", "51-200"],
        )];
        let fv = extract(
            &LeadProfile {
                company_size: Some("100".into()),
                ..Default::default()
            },
            None,
        )
        .unwrap();
        let result = score(&criteria, &fv, &ScoringConfig::default()).unwrap();
        assert_eq!(result.score, 100.0);
        assert!(result.breakdown["Size"].note.contains("51-200"));
    }

    #[test]
    fn custom_criteria_read_custom_fields() {
        let criteria = vec![criterion(1, "Region", CriterionDataType::Custom, 50, &["EMEA", "NA"])];
        let fv = extract(
            &LeadProfile {
                custom_fields: BTreeMap::from([("region".to_string(), "emea".to_string())]),
                ..Default::default()
            },
            None,
        )
        .unwrap();
        assert_eq!(score(&criteria, &fv, &ScoringConfig::default()).unwrap().score, 100.0);
    }

    #[test]
    fn scoring_is_deterministic_and_bounded() {
        let criteria = vec![
            criterion(1, "Budget", CriterionDataType::Budget, 37, &["$25k-$50k"]),
            criterion(2, "Industry", CriterionDataType::Industry, 63, &["Fintech", "SaaS"]),
            criterion(3, "Timeline", CriterionDataType::Timeline, 15, &["1-3 months"]),
            criterion(4, "Title", CriterionDataType::JobTitle, 90, &["VP", "Director"]),
        ];
        let fv = extract(
            &LeadProfile {
                budget: Some("$20k".into()),
                industry: Some("Fintech".into()),
                timeline: Some("6 months".into()),
                job_title: Some("Head of Ops".into()),
                ..Default::default()
            },
            None,
        )
        .unwrap();
        let a = score(&criteria, &fv, &ScoringConfig::default()).unwrap();
        let b = score(&criteria, &fv, &ScoringConfig::default()).unwrap();
        assert_eq!(a.score.to_bits(), b.score.to_bits());
        assert_eq!(a, b);
        assert!((0.0..=100.0).contains(&a.score));
        let order: Vec<&str> = a.breakdown.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["Budget", "Industry", "Timeline", "Title"]);
    }

    // -- Thresholds ----------------------------------------------------------

    #[test]
    fn thresholds_label_boundaries() {
        let t = LabelThresholds::default();
        assert_eq!(t.label_for(70.0), Label::Hot);
        assert_eq!(t.label_for(69.99), Label::Warm);
        assert_eq!(t.label_for(40.0), Label::Warm);
        assert_eq!(t.label_for(39.99), Label::Cold);
    }

    #[test]
    fn non_monotonic_thresholds_rejected() {
        assert!(LabelThresholds::new(40.0, 70.0).is_err());
        assert!(LabelThresholds::new(50.0, 50.0).is_err());
        assert!(LabelThresholds::new(120.0, 40.0).is_err());
        assert!(LabelThresholds::new(80.0, 30.0).is_ok());
    }

    #[test]
    fn labels_are_ordered() {
        assert!(Label::Cold < Label::Warm && Label::Warm < Label::Hot);
        assert_eq!("warm".parse::<Label>().unwrap(), Label::Warm);
    }
}
