//! Learned scoring model contract, lifecycle states, and the default learner.
//!
//! The learning algorithm is pluggable: a [`Learner`] fits
//! [`ModelParameters`], a tagged document that is persisted with the model
//! version and knows how to predict. Adding an algorithm means adding a
//! learner and a parameters variant; callers only see
//! [`ModelParameters::predict`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ModelError;
use crate::features::{feature_schema, FeatureVector};

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Per-organization model lifecycle.
///
/// `NoModel` and `Training` describe the organization, not a stored version;
/// persisted versions are always `Trained`, `Active` or `Superseded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    NoModel,
    Training,
    Trained,
    Active,
    Superseded,
}

impl ModelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoModel => "no_model",
            Self::Training => "training",
            Self::Trained => "trained",
            Self::Active => "active",
            Self::Superseded => "superseded",
        }
    }

    /// Check a lifecycle transition.
    ///
    /// Superseded is terminal: a demoted version is never re-activated.
    pub fn ensure_transition(self, to: ModelState) -> Result<(), ModelError> {
        use ModelState::*;
        let allowed = matches!(
            (self, to),
            (NoModel, Training)
                | (Active, Training)
                | (Trained, Training)
                | (Superseded, Training)
                | (Training, Trained)
                | (Training, NoModel)
                | (Trained, Active)
                | (Active, Superseded)
        );
        if allowed {
            Ok(())
        } else {
            Err(ModelError::InvalidTransition {
                from: self.as_str(),
                to: to.as_str(),
            })
        }
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_model" => Ok(Self::NoModel),
            "training" => Ok(Self::Training),
            "trained" => Ok(Self::Trained),
            "active" => Ok(Self::Active),
            "superseded" => Ok(Self::Superseded),
            other => Err(format!("unknown model state '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Held-out evaluation of a trained model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Feature name to relative importance in `[0, 1]`.
    pub feature_importance: BTreeMap<String, f64>,
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Fitted parameters of a model version, tagged by algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum ModelParameters {
    Logistic(LogisticParameters),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticParameters {
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl ModelParameters {
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Logistic(_) => "logistic",
        }
    }

    pub fn feature_names(&self) -> &[String] {
        match self {
            Self::Logistic(p) => &p.feature_names,
        }
    }

    /// Conversion probability in `[0, 1]`.
    pub fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        match self {
            Self::Logistic(p) => {
                if p.weights.len() != p.feature_names.len() {
                    return Err(ModelError::FeatureShapeMismatch(format!(
                        "{} weights for {} features",
                        p.weights.len(),
                        p.feature_names.len()
                    )));
                }
                let x = features.dense(&p.feature_names)?;
                let probability = sigmoid(p.bias + dot(&p.weights, &x));
                if probability.is_finite() {
                    Ok(probability)
                } else {
                    Err(ModelError::NonFinite)
                }
            }
        }
    }

    /// Relative importance per feature, `|w_i| / max |w|`.
    pub fn feature_importance(&self) -> BTreeMap<String, f64> {
        match self {
            Self::Logistic(p) => {
                let max = p.weights.iter().fold(0.0_f64, |m, w| m.max(w.abs()));
                p.feature_names
                    .iter()
                    .zip(&p.weights)
                    .map(|(name, w)| {
                        let importance = if max > 0.0 { w.abs() / max } else { 0.0 };
                        (name.clone(), importance)
                    })
                    .collect()
            }
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

// ---------------------------------------------------------------------------
// Learner contract
// ---------------------------------------------------------------------------

/// One labeled training example.
#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub features: FeatureVector,
    pub converted: bool,
}

/// A pluggable fitting strategy.
pub trait Learner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fit parameters. Implementations must poll `cancel` and return
    /// [`ModelError::Cancelled`] promptly once it fires.
    fn fit(
        &self,
        samples: &[TrainingSample],
        cancel: &CancellationToken,
    ) -> Result<ModelParameters, ModelError>;
}

// ---------------------------------------------------------------------------
// Default learner: logistic regression
// ---------------------------------------------------------------------------

/// L2-regularised logistic regression fitted by full-batch gradient
/// descent. Deterministic: no sampling, fixed iteration order.
#[derive(Debug, Clone)]
pub struct LogisticLearner {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

impl Default for LogisticLearner {
    fn default() -> Self {
        Self {
            epochs: 500,
            learning_rate: 0.5,
            l2: 0.01,
        }
    }
}

impl Learner for LogisticLearner {
    fn name(&self) -> &'static str {
        "logistic"
    }

    fn fit(
        &self,
        samples: &[TrainingSample],
        cancel: &CancellationToken,
    ) -> Result<ModelParameters, ModelError> {
        let feature_names = feature_schema();
        let rows: Vec<(Vec<f64>, f64)> = samples
            .iter()
            .map(|s| {
                let y = if s.converted { 1.0 } else { 0.0 };
                s.features.dense(&feature_names).map(|x| (x, y))
            })
            .collect::<Result<_, _>>()?;

        let n = rows.len().max(1) as f64;
        let mut weights = vec![0.0; feature_names.len()];
        let mut bias = 0.0;

        for _ in 0..self.epochs {
            if cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }
            let mut grad_w = vec![0.0; weights.len()];
            let mut grad_b = 0.0;
            for (x, y) in &rows {
                let err = sigmoid(bias + dot(&weights, x)) - y;
                for (g, xi) in grad_w.iter_mut().zip(x) {
                    *g += err * xi;
                }
                grad_b += err;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= self.learning_rate * (g / n + self.l2 * *w);
            }
            bias -= self.learning_rate * grad_b / n;
        }

        if weights.iter().any(|w| !w.is_finite()) || !bias.is_finite() {
            return Err(ModelError::NonFinite);
        }

        Ok(ModelParameters::Logistic(LogisticParameters {
            feature_names,
            weights,
            bias,
        }))
    }
}

// ---------------------------------------------------------------------------
// Active model snapshot
// ---------------------------------------------------------------------------

/// The promoted model of one organization, as seen by a scoring pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveModel {
    pub model_version: i32,
    pub parameters: ModelParameters,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::features::{extract, LeadProfile};

    fn sample(budget: &str, title: &str, converted: bool) -> TrainingSample {
        TrainingSample {
            features: extract(
                &LeadProfile {
                    budget: Some(budget.into()),
                    job_title: Some(title.into()),
                    ..Default::default()
                },
                None,
            )
            .unwrap(),
            converted,
        }
    }

    fn separable() -> Vec<TrainingSample> {
        (0..20)
            .flat_map(|_| {
                [
                    sample("$150k", "CEO", true),
                    sample("$5k", "Analyst", false),
                ]
            })
            .collect()
    }

    #[test]
    fn lifecycle_allows_documented_transitions() {
        assert!(ModelState::NoModel.ensure_transition(ModelState::Training).is_ok());
        assert!(ModelState::Training.ensure_transition(ModelState::Trained).is_ok());
        assert!(ModelState::Trained.ensure_transition(ModelState::Active).is_ok());
        assert!(ModelState::Active.ensure_transition(ModelState::Superseded).is_ok());
    }

    #[test]
    fn superseded_cannot_be_reactivated() {
        assert_matches!(
            ModelState::Superseded.ensure_transition(ModelState::Active),
            Err(ModelError::InvalidTransition { from: "superseded", to: "active" })
        );
        assert!(ModelState::Training.ensure_transition(ModelState::Active).is_err());
    }

    #[test]
    fn logistic_learner_separates_obvious_classes() {
        let params = LogisticLearner::default()
            .fit(&separable(), &CancellationToken::new())
            .unwrap();
        let good = sample("$150k", "CEO", true).features;
        let bad = sample("$5k", "Analyst", false).features;
        assert!(params.predict(&good).unwrap() > 0.5);
        assert!(params.predict(&bad).unwrap() < 0.5);
    }

    #[test]
    fn fitting_is_deterministic() {
        let learner = LogisticLearner::default();
        let a = learner.fit(&separable(), &CancellationToken::new()).unwrap();
        let b = learner.fit(&separable(), &CancellationToken::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cancelled_fit_returns_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            LogisticLearner::default().fit(&separable(), &cancel),
            Err(ModelError::Cancelled)
        );
    }

    #[test]
    fn importance_is_normalized() {
        let params = LogisticLearner::default()
            .fit(&separable(), &CancellationToken::new())
            .unwrap();
        let importance = params.feature_importance();
        assert!(importance.values().all(|v| (0.0..=1.0).contains(v)));
        assert!(importance.values().any(|v| (*v - 1.0).abs() < 1e-12));
    }

    #[test]
    fn predict_rejects_unknown_feature() {
        let params = ModelParameters::Logistic(LogisticParameters {
            feature_names: vec!["employee_growth".into()],
            weights: vec![1.0],
            bias: 0.0,
        });
        let fv = sample("$5k", "Analyst", false).features;
        assert_eq!(
            params.predict(&fv),
            Err(ModelError::FeatureShapeMismatch("employee_growth".into()))
        );
    }

    #[test]
    fn parameters_round_trip_through_json() {
        let params = ModelParameters::Logistic(LogisticParameters {
            feature_names: vec!["budget".into()],
            weights: vec![0.5],
            bias: -0.1,
        });
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["algorithm"], "logistic");
        let back: ModelParameters = serde_json::from_value(json).unwrap();
        assert_eq!(back, params);
    }
}
