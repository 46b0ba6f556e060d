//! Scoring engine orchestration.
//!
//! - [`registry`]: per-organization snapshot of the active model.
//! - [`qualifier`]: one scoring pass (extract, score, blend, persist, notify).
//! - [`training`]: single-flight, cancellable model training and activation.

pub mod qualifier;
pub mod registry;
pub mod training;

pub use qualifier::Qualifier;
pub use registry::ModelRegistry;
pub use training::TrainingCoordinator;
