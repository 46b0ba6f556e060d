//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Every query that reads tenant
//! data filters by `organization_id`.

pub mod criteria_repo;
pub mod enrichment_repo;
pub mod lead_repo;
pub mod outcome_repo;
pub mod qualification_repo;
pub mod scoring_model_repo;
pub mod settings_repo;
pub mod webhook_repo;

pub use criteria_repo::CriteriaRepo;
pub use enrichment_repo::EnrichmentRepo;
pub use lead_repo::LeadRepo;
pub use outcome_repo::OutcomeRepo;
pub use qualification_repo::QualificationRepo;
pub use scoring_model_repo::ScoringModelRepo;
pub use settings_repo::ScoringSettingsRepo;
pub use webhook_repo::WebhookRepo;
