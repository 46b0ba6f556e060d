//! Score blending: combine the rule score with the active model's score.
//!
//! Blend policy `weighted-v1`:
//! - `RuleOnly`: the rule result passes through unchanged.
//! - `Blended`: `final = (1 - w) * rule + w * (100 * p)` where `p` is the
//!   model's conversion probability and `w` the configured model weight.
//! - `ModelOverride`: `final = 100 * p`.
//!
//! If the model cannot score the feature vector the result falls back to the
//! rule score and is flagged `degraded`. Reasoning and recommended action are
//! derived from the rule breakdown only, so explanations do not shift between
//! model versions.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ScoringError;
use crate::features::FeatureVector;
use crate::model::ActiveModel;
use crate::scoring::{round2, CriterionScore, Label, LabelThresholds, MatchStatus, RuleScore};

/// Identifier of the blend arithmetic, stored with every result.
pub const BLEND_POLICY_VERSION: &str = "weighted-v1";

/// Default model weight for the `blended` policy.
pub const DEFAULT_MODEL_WEIGHT: f64 = 0.5;

/// Enrichment confidence below which reasoning warns about data quality.
const LOW_ENRICHMENT_CONFIDENCE: f64 = 0.5;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Organization-level choice of blend policy, as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendPolicy {
    RuleOnly,
    Blended,
    ModelOverride,
}

impl BlendPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuleOnly => "rule_only",
            Self::Blended => "blended",
            Self::ModelOverride => "model_override",
        }
    }
}

impl fmt::Display for BlendPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlendPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule_only" => Ok(Self::RuleOnly),
            "blended" => Ok(Self::Blended),
            "model_override" => Ok(Self::ModelOverride),
            other => Err(format!("unknown blend policy '{other}'")),
        }
    }
}

/// Per-organization blend configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendSettings {
    pub thresholds: LabelThresholds,
    pub policy: BlendPolicy,
    pub model_weight: f64,
}

impl BlendSettings {
    /// Validate stored values. Bad thresholds or weights are a
    /// configuration error for the scoring call.
    pub fn new(
        hot: f64,
        warm: f64,
        policy: BlendPolicy,
        model_weight: f64,
    ) -> Result<Self, ScoringError> {
        let thresholds = LabelThresholds::new(hot, warm)?;
        if !(0.0..=1.0).contains(&model_weight) {
            return Err(ScoringError::InvalidSetting(format!(
                "model_weight {model_weight} must be within [0, 1]"
            )));
        }
        Ok(Self {
            thresholds,
            policy,
            model_weight,
        })
    }
}

impl Default for BlendSettings {
    fn default() -> Self {
        Self {
            thresholds: LabelThresholds::default(),
            policy: BlendPolicy::Blended,
            model_weight: DEFAULT_MODEL_WEIGHT,
        }
    }
}

/// The strategy used for one scoring pass.
#[derive(Debug, Clone)]
pub enum BlendStrategy {
    RuleOnly,
    Blended {
        model: Arc<ActiveModel>,
        model_weight: f64,
    },
    ModelOverride {
        model: Arc<ActiveModel>,
    },
}

impl BlendStrategy {
    /// Resolve the configured policy against the active model snapshot.
    /// Without an active model every policy is rule-only.
    pub fn resolve(
        policy: BlendPolicy,
        active: Option<Arc<ActiveModel>>,
        model_weight: f64,
    ) -> Self {
        match (policy, active) {
            (BlendPolicy::Blended, Some(model)) => Self::Blended {
                model,
                model_weight: model_weight.clamp(0.0, 1.0),
            },
            (BlendPolicy::ModelOverride, Some(model)) => Self::ModelOverride { model },
            _ => Self::RuleOnly,
        }
    }

    fn model(&self) -> Option<&ActiveModel> {
        match self {
            Self::RuleOnly => None,
            Self::Blended { model, .. } | Self::ModelOverride { model } => Some(model),
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Final qualification of a lead for one scoring invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualificationResult {
    pub score: f64,
    pub label: Label,
    pub reasoning: String,
    pub breakdown: IndexMap<String, CriterionScore>,
    pub recommended_action: String,
    pub rule_score: f64,
    pub model_score: Option<f64>,
    pub model_version: Option<i32>,
    /// Set when a model was configured but could not score this lead.
    pub degraded: bool,
    pub blend_policy: String,
}

// ---------------------------------------------------------------------------
// Blend
// ---------------------------------------------------------------------------

/// Combine a rule result with the strategy's model. Never fails: model
/// errors degrade to the rule score and set `degraded`, which callers log.
pub fn blend(
    rule: RuleScore,
    strategy: &BlendStrategy,
    features: &FeatureVector,
    thresholds: &LabelThresholds,
) -> QualificationResult {
    let prediction = strategy
        .model()
        .map(|m| (m.model_version, m.parameters.predict(features)));

    let (score, model_score, model_version, degraded) = match (strategy, prediction) {
        (BlendStrategy::Blended { model_weight, .. }, Some((version, Ok(p)))) => {
            let model_score = 100.0 * p;
            let combined = (1.0 - model_weight) * rule.score + model_weight * model_score;
            (combined, Some(round2(model_score)), Some(version), false)
        }
        (BlendStrategy::ModelOverride { .. }, Some((version, Ok(p)))) => {
            let model_score = 100.0 * p;
            (model_score, Some(round2(model_score)), Some(version), false)
        }
        (_, Some((version, Err(_)))) => (rule.score, None, Some(version), true),
        _ => (rule.score, None, None, false),
    };

    let score = round2(score.clamp(0.0, 100.0));
    let label = thresholds.label_for(score);
    let reasoning = build_reasoning(&rule, label, score, features, degraded);
    let recommended_action = recommend_action(&rule, label);

    QualificationResult {
        score,
        label,
        reasoning,
        breakdown: rule.breakdown,
        recommended_action,
        rule_score: rule.score,
        model_score,
        model_version,
        degraded,
        blend_policy: BLEND_POLICY_VERSION.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Explanations
// ---------------------------------------------------------------------------

fn names_with(rule: &RuleScore, status: MatchStatus) -> Vec<&str> {
    rule.breakdown
        .iter()
        .filter(|(_, c)| c.status == status)
        .map(|(name, _)| name.as_str())
        .collect()
}

/// Human-readable reasoning derived from the breakdown.
pub fn build_reasoning(
    rule: &RuleScore,
    label: Label,
    score: f64,
    features: &FeatureVector,
    degraded: bool,
) -> String {
    let mut parts = Vec::new();

    if features.populated_fields() == 0 {
        parts.push("Insufficient data: the lead has no usable profile fields.".to_string());
    }

    parts.push(format!("Scored {score:.0}/100 ({label})."));

    let strong = names_with(rule, MatchStatus::Match);
    let partial = names_with(rule, MatchStatus::Partial);
    let weak = names_with(rule, MatchStatus::Miss);
    let unknown = names_with(rule, MatchStatus::Unknown);

    if !strong.is_empty() {
        parts.push(format!("Strong fit on {}.", strong.join(", ")));
    }
    if !partial.is_empty() {
        parts.push(format!("Partial fit on {}.", partial.join(", ")));
    }
    if !weak.is_empty() {
        parts.push(format!("Poor fit on {}.", weak.join(", ")));
    }
    if !unknown.is_empty() {
        parts.push(format!("No data for {}.", unknown.join(", ")));
    }
    if let Some(confidence) = features.enrichment_confidence() {
        if confidence < LOW_ENRICHMENT_CONFIDENCE {
            parts.push(format!(
                "Enrichment confidence is low ({:.0}%).",
                confidence * 100.0
            ));
        }
    }
    if degraded {
        parts.push("Model scoring unavailable; rule score used.".to_string());
    }

    parts.join(" ")
}

/// Next step for sales, derived from the label and data gaps.
pub fn recommend_action(rule: &RuleScore, label: Label) -> String {
    let base = match label {
        Label::Hot => "Route to sales for outreach within 24 hours",
        Label::Warm => "Add to nurture sequence and re-qualify after engagement",
        Label::Cold => "Deprioritize; keep in marketing automation",
    };
    let unknown: Vec<&str> = rule.unknown_criteria().collect();
    if unknown.is_empty() {
        format!("{base}.")
    } else {
        format!("{base}; collect missing data: {}.", unknown.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{CriterionDataType, IcpCriterion};
    use crate::features::{extract, LeadProfile};
    use crate::model::{LogisticParameters, ModelParameters};
    use crate::scoring::{score, ScoringConfig};

    fn criteria() -> Vec<IcpCriterion> {
        vec![
            IcpCriterion::new(1, "Budget", CriterionDataType::Budget, 8, ["$50k+".to_string()]),
            IcpCriterion::new(2, "Industry", CriterionDataType::Industry, 2, ["SaaS".to_string()]),
        ]
    }

    fn features() -> FeatureVector {
        extract(
            &LeadProfile {
                budget: Some("$50k+".into()),
                industry: Some("Retail".into()),
                ..Default::default()
            },
            None,
        )
        .unwrap()
    }

    fn model(feature: &str, weight: f64, bias: f64) -> Arc<ActiveModel> {
        Arc::new(ActiveModel {
            model_version: 3,
            parameters: ModelParameters::Logistic(LogisticParameters {
                feature_names: vec![feature.to_string()],
                weights: vec![weight],
                bias,
            }),
        })
    }

    fn rule() -> RuleScore {
        score(&criteria(), &features(), &ScoringConfig::default()).unwrap()
    }

    #[test]
    fn no_model_passes_rule_result_through() {
        let strategy = BlendStrategy::resolve(BlendPolicy::Blended, None, 0.5);
        let result = blend(rule(), &strategy, &features(), &LabelThresholds::default());
        assert_eq!(result.score, 80.0);
        assert_eq!(result.rule_score, 80.0);
        assert_eq!(result.label, Label::Hot);
        assert_eq!(result.model_score, None);
        assert!(!result.degraded);
    }

    #[test]
    fn blended_averages_rule_and_model() {
        // bias 0, weight 0 -> p = 0.5 -> model score 50
        let strategy = BlendStrategy::resolve(BlendPolicy::Blended, Some(model("budget", 0.0, 0.0)), 0.5);
        let result = blend(rule(), &strategy, &features(), &LabelThresholds::default());
        assert_eq!(result.model_score, Some(50.0));
        assert_eq!(result.score, 65.0);
        assert_eq!(result.label, Label::Warm);
        assert_eq!(result.model_version, Some(3));
    }

    #[test]
    fn override_uses_model_score() {
        let strategy = BlendStrategy::resolve(BlendPolicy::ModelOverride, Some(model("budget", 0.0, 0.0)), 0.5);
        let result = blend(rule(), &strategy, &features(), &LabelThresholds::default());
        assert_eq!(result.score, 50.0);
        assert_eq!(result.rule_score, 80.0);
    }

    #[test]
    fn failing_model_degrades_to_rule_score() {
        let strategy = BlendStrategy::resolve(
            BlendPolicy::ModelOverride,
            Some(model("employee_growth", 1.0, 0.0)),
            0.5,
        );
        let result = blend(rule(), &strategy, &features(), &LabelThresholds::default());
        assert!(result.degraded);
        assert_eq!(result.score, 80.0);
        assert_eq!(result.model_score, None);
        assert!(result.reasoning.contains("rule score used"));
    }

    #[test]
    fn reasoning_is_independent_of_model() {
        let with_model = blend(
            rule(),
            &BlendStrategy::resolve(BlendPolicy::Blended, Some(model("budget", 2.0, 1.0)), 0.1),
            &features(),
            &LabelThresholds::default(),
        );
        let rule_only = blend(rule(), &BlendStrategy::RuleOnly, &features(), &LabelThresholds::default());
        assert!(with_model.reasoning.contains("Strong fit on Budget"));
        assert!(rule_only.reasoning.contains("Poor fit on Industry"));
        assert_eq!(with_model.recommended_action, rule_only.recommended_action);
    }

    #[test]
    fn unknown_criteria_requested_in_action() {
        let fv = extract(
            &LeadProfile {
                industry: Some("SaaS".into()),
                ..Default::default()
            },
            None,
        )
        .unwrap();
        let r = score(&criteria(), &fv, &ScoringConfig::default()).unwrap();
        let result = blend(r, &BlendStrategy::RuleOnly, &fv, &LabelThresholds::default());
        assert_eq!(result.label, Label::Cold);
        assert!(result.recommended_action.contains("collect missing data: Budget"));
        assert!(result.reasoning.contains("No data for Budget"));
    }

    #[test]
    fn all_missing_vector_reports_insufficient_data() {
        let fv = FeatureVector::all_missing();
        let r = score(&criteria(), &fv, &ScoringConfig::default()).unwrap();
        let result = blend(r, &BlendStrategy::RuleOnly, &fv, &LabelThresholds::default());
        assert_eq!(result.score, 0.0);
        assert!(result.reasoning.starts_with("Insufficient data"));
    }

    #[test]
    fn settings_reject_bad_values() {
        assert!(BlendSettings::new(70.0, 40.0, BlendPolicy::Blended, 0.5).is_ok());
        assert_eq!(
            BlendSettings::new(40.0, 70.0, BlendPolicy::Blended, 0.5),
            Err(ScoringError::NonMonotonicThresholds { warm: 70.0, hot: 40.0 })
        );
        assert!(BlendSettings::new(70.0, 40.0, BlendPolicy::Blended, 1.5).is_err());
    }

    #[test]
    fn policy_parses() {
        assert_eq!("model_override".parse::<BlendPolicy>().unwrap(), BlendPolicy::ModelOverride);
        assert!("ensemble".parse::<BlendPolicy>().is_err());
    }
}
