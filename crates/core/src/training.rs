//! Training pipeline: sufficiency checks, held-out split, evaluation, and
//! the retraining recommendation.
//!
//! Every call to [`train`] that succeeds yields a new model; nothing here
//! deduplicates by content.

use tokio_util::sync::CancellationToken;

use crate::error::ModelError;
use crate::model::{Learner, ModelParameters, PerformanceMetrics, TrainingSample};
use crate::scoring::round2;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Outcomes required before a first model may be trained.
pub const DEFAULT_MIN_TRAINING_OUTCOMES: usize = 50;

/// Minimum outcomes per class (converted / rejected).
pub const DEFAULT_MIN_OUTCOMES_PER_CLASS: usize = 5;

/// New outcomes since the active model after which retraining is advised.
pub const DEFAULT_RETRAIN_TRIGGER: i64 = 50;

/// Every n-th sample (in caller order) is held out for evaluation.
const HOLDOUT_EVERY: usize = 5;

/// Probability at or above which a prediction counts as "converted".
const DECISION_THRESHOLD: f64 = 0.5;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingConfig {
    pub min_total: usize,
    pub min_per_class: usize,
    pub retrain_trigger: i64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_total: DEFAULT_MIN_TRAINING_OUTCOMES,
            min_per_class: DEFAULT_MIN_OUTCOMES_PER_CLASS,
            retrain_trigger: DEFAULT_RETRAIN_TRIGGER,
        }
    }
}

// ---------------------------------------------------------------------------
// Training
// ---------------------------------------------------------------------------

/// Output of a successful training run, ready to be stored as a new version.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub parameters: ModelParameters,
    pub metrics: PerformanceMetrics,
    pub trained_on_count: usize,
}

/// Reject sample sets that are too small or too imbalanced.
pub fn check_sufficiency(
    samples: &[TrainingSample],
    config: &TrainingConfig,
) -> Result<(), ModelError> {
    let converted = samples.iter().filter(|s| s.converted).count();
    let rejected = samples.len() - converted;
    if samples.len() < config.min_total
        || converted < config.min_per_class
        || rejected < config.min_per_class
    {
        return Err(ModelError::InsufficientData {
            total: samples.len(),
            converted,
            rejected,
            min_total: config.min_total,
            min_per_class: config.min_per_class,
        });
    }
    Ok(())
}

/// Fit and evaluate a model on `samples`, which the caller orders
/// deterministically (by lead id).
///
/// Fails without producing anything when data is insufficient or the run is
/// cancelled.
pub fn train(
    learner: &dyn Learner,
    samples: &[TrainingSample],
    config: &TrainingConfig,
    cancel: &CancellationToken,
) -> Result<TrainedModel, ModelError> {
    check_sufficiency(samples, config)?;

    let (fit_set, holdout): (Vec<_>, Vec<_>) = samples
        .iter()
        .enumerate()
        .partition(|(i, _)| i % HOLDOUT_EVERY != HOLDOUT_EVERY - 1);
    let fit_set: Vec<TrainingSample> = fit_set.into_iter().map(|(_, s)| s.clone()).collect();
    let holdout: Vec<TrainingSample> = holdout.into_iter().map(|(_, s)| s.clone()).collect();

    let parameters = learner.fit(&fit_set, cancel)?;
    if cancel.is_cancelled() {
        return Err(ModelError::Cancelled);
    }

    let eval_set = if holdout.is_empty() { &fit_set } else { &holdout };
    let metrics = evaluate(&parameters, eval_set)?;

    Ok(TrainedModel {
        parameters,
        metrics,
        trained_on_count: samples.len(),
    })
}

/// Confusion-matrix metrics at a 0.5 decision threshold.
pub fn evaluate(
    parameters: &ModelParameters,
    samples: &[TrainingSample],
) -> Result<PerformanceMetrics, ModelError> {
    let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
    for sample in samples {
        let predicted = parameters.predict(&sample.features)? >= DECISION_THRESHOLD;
        match (predicted, sample.converted) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, false) => tn += 1,
            (false, true) => fn_ += 1,
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let accuracy = ratio(tp + tn, samples.len());
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Ok(PerformanceMetrics {
        accuracy: round2(accuracy),
        precision: round2(precision),
        recall: round2(recall),
        f1_score: round2(f1_score),
        feature_importance: parameters.feature_importance(),
    })
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// Advisory flag: enough outcomes arrived since the active model was trained.
///
/// Never starts training on its own.
pub fn retrain_recommended(
    total_outcomes: i64,
    active_trained_on_count: Option<i64>,
    config: &TrainingConfig,
) -> bool {
    match active_trained_on_count {
        Some(trained_on) => total_outcomes - trained_on > config.retrain_trigger,
        None => false,
    }
}

/// Whether the first model for an organization should be trained now.
pub fn initial_training_due(
    total_outcomes: i64,
    has_any_model: bool,
    config: &TrainingConfig,
) -> bool {
    !has_any_model && total_outcomes >= config.min_total as i64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::features::{extract, LeadProfile};
    use crate::model::LogisticLearner;

    fn sample(budget: &str, converted: bool) -> TrainingSample {
        TrainingSample {
            features: extract(
                &LeadProfile {
                    budget: Some(budget.into()),
                    ..Default::default()
                },
                None,
            )
            .unwrap(),
            converted,
        }
    }

    fn samples(converted: usize, rejected: usize) -> Vec<TrainingSample> {
        let mut out: Vec<TrainingSample> = (0..converted).map(|_| sample("$200k", true)).collect();
        out.extend((0..rejected).map(|_| sample("$2k", false)));
        out
    }

    #[test]
    fn too_few_outcomes_is_insufficient() {
        let result = train(
            &LogisticLearner::default(),
            &samples(20, 20),
            &TrainingConfig::default(),
            &CancellationToken::new(),
        );
        assert_matches!(result, Err(ModelError::InsufficientData { total: 40, .. }));
    }

    #[test]
    fn imbalanced_outcomes_are_insufficient() {
        let result = train(
            &LogisticLearner::default(),
            &samples(58, 2),
            &TrainingConfig::default(),
            &CancellationToken::new(),
        );
        assert_matches!(
            result,
            Err(ModelError::InsufficientData { converted: 58, rejected: 2, .. })
        );
    }

    #[test]
    fn training_produces_metrics() {
        let trained = train(
            &LogisticLearner::default(),
            &samples(30, 30),
            &TrainingConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(trained.trained_on_count, 60);
        assert_eq!(trained.metrics.accuracy, 1.0);
        assert_eq!(trained.metrics.f1_score, 1.0);
        assert!(!trained.metrics.feature_importance.is_empty());
    }

    #[test]
    fn cancelled_training_produces_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = train(
            &LogisticLearner::default(),
            &samples(30, 30),
            &TrainingConfig::default(),
            &cancel,
        );
        assert_eq!(result, Err(ModelError::Cancelled));
    }

    #[test]
    fn retrain_recommendation_counts_new_outcomes() {
        let config = TrainingConfig::default();
        assert!(!retrain_recommended(120, None, &config));
        assert!(!retrain_recommended(110, Some(60), &config));
        assert!(retrain_recommended(111, Some(60), &config));
    }

    #[test]
    fn initial_training_needs_threshold_and_no_model() {
        let config = TrainingConfig::default();
        assert!(!initial_training_due(49, false, &config));
        assert!(initial_training_due(50, false, &config));
        assert!(!initial_training_due(500, true, &config));
    }
}
