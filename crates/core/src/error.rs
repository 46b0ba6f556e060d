use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration problems that make a scoring call impossible.
///
/// Fatal to the scoring call that hit them; nothing is persisted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("No ICP criteria configured (total weight is zero)")]
    NoCriteria,

    #[error("Label thresholds must be increasing: warm ({warm}) < hot ({hot}) within [0, 100]")]
    NonMonotonicThresholds { warm: f64, hot: f64 },

    #[error("Weight {0} is outside the accepted range")]
    InvalidWeight(i32),

    #[error("Invalid criterion '{name}': {reason}")]
    InvalidCriterion { name: String, reason: String },

    #[error("Invalid scoring setting: {0}")]
    InvalidSetting(String),
}

/// Raised when a lead carries nothing the feature extractor can use.
///
/// Callers degrade to an all-missing feature vector instead of failing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataQualityError {
    #[error("Lead has no usable fields and no enrichment data")]
    NoUsableFields,
}

/// Failures of the learned-scoring layer. Never fatal to scoring.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error(
        "Insufficient training data: {total} outcomes ({converted} converted, {rejected} rejected); \
         need {min_total} total and {min_per_class} per class"
    )]
    InsufficientData {
        total: usize,
        converted: usize,
        rejected: usize,
        min_total: usize,
        min_per_class: usize,
    },

    #[error("A training run is already in progress for organization {0}")]
    TrainingInProgress(DbId),

    #[error("Model expects feature '{0}' which the feature vector does not provide")]
    FeatureShapeMismatch(String),

    #[error("Model produced a non-finite score")]
    NonFinite,

    #[error("Training was cancelled")]
    Cancelled,

    #[error("Invalid model state transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}
