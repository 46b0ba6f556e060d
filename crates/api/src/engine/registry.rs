//! Per-organization active model references.
//!
//! The database is authoritative. Entries are cached for a short time so
//! scoring passes do not reload model parameters on every call; activation
//! in this process replaces the entry right after its transaction commits.
//! A scoring pass clones the `Arc` once and uses it for the whole pass, so
//! it sees either the old or the new model, never a mix.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use leadq_core::model::ActiveModel;
use leadq_core::types::DbId;
use leadq_db::repositories::ScoringModelRepo;
use leadq_db::DbPool;
use tokio::sync::RwLock;

/// How long a cached entry is trusted before the database is consulted
/// again. Bounds staleness when another instance activates a model.
const CACHE_TTL: Duration = Duration::from_secs(30);

struct Entry {
    model: Option<Arc<ActiveModel>>,
    loaded_at: Instant,
}

#[derive(Default)]
pub struct ModelRegistry {
    entries: RwLock<HashMap<DbId, Entry>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The organization's active model, if any.
    ///
    /// A stored model whose parameters cannot be decoded is treated as
    /// absent so scoring falls back to rules.
    pub async fn snapshot(
        &self,
        pool: &DbPool,
        organization_id: DbId,
    ) -> Result<Option<Arc<ActiveModel>>, sqlx::Error> {
        if let Some(entry) = self.entries.read().await.get(&organization_id) {
            if entry.loaded_at.elapsed() < CACHE_TTL {
                return Ok(entry.model.clone());
            }
        }

        let started = Instant::now();
        let model = match ScoringModelRepo::find_active(pool, organization_id).await? {
            Some(row) => match row.to_active() {
                Ok(active) => Some(Arc::new(active)),
                Err(e) => {
                    tracing::error!(
                        organization_id,
                        model_version = row.model_version,
                        error = %e,
                        "Active model parameters could not be decoded"
                    );
                    None
                }
            },
            None => None,
        };

        // Keep an entry written by an activation that finished mid-load.
        let mut entries = self.entries.write().await;
        match entries.get(&organization_id) {
            Some(existing) if existing.loaded_at > started => Ok(existing.model.clone()),
            _ => {
                entries.insert(
                    organization_id,
                    Entry {
                        model: model.clone(),
                        loaded_at: started,
                    },
                );
                Ok(model)
            }
        }
    }

    /// Replace the organization's entry after an activation commits.
    ///
    /// An older version never replaces a newer cached one, so interleaved
    /// activations cannot leave a superseded model cached.
    pub async fn set_active(&self, organization_id: DbId, model: ActiveModel) {
        let mut entries = self.entries.write().await;
        let cached_version = entries
            .get(&organization_id)
            .and_then(|entry| entry.model.as_ref())
            .map(|cached| cached.model_version);
        if cached_version.is_some_and(|cached| cached > model.model_version) {
            tracing::debug!(
                organization_id,
                cached_version,
                model_version = model.model_version,
                "Ignoring activation older than the cached model"
            );
            return;
        }
        entries.insert(
            organization_id,
            Entry {
                model: Some(Arc::new(model)),
                loaded_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use leadq_core::model::{LogisticParameters, ModelParameters};

    use super::*;

    fn active(model_version: i32) -> ActiveModel {
        ActiveModel {
            model_version,
            parameters: ModelParameters::Logistic(LogisticParameters {
                feature_names: Vec::new(),
                weights: Vec::new(),
                bias: 0.0,
            }),
        }
    }

    async fn cached_version(registry: &ModelRegistry, organization_id: DbId) -> Option<i32> {
        registry
            .entries
            .read()
            .await
            .get(&organization_id)
            .and_then(|entry| entry.model.as_ref())
            .map(|model| model.model_version)
    }

    #[tokio::test]
    async fn newer_activation_replaces_entry() {
        let registry = ModelRegistry::new();
        registry.set_active(1, active(1)).await;
        registry.set_active(1, active(2)).await;
        assert_eq!(cached_version(&registry, 1).await, Some(2));
    }

    #[tokio::test]
    async fn late_older_activation_is_ignored() {
        let registry = ModelRegistry::new();
        registry.set_active(1, active(3)).await;
        registry.set_active(1, active(2)).await;
        assert_eq!(cached_version(&registry, 1).await, Some(3));

        // Other organizations are independent.
        registry.set_active(2, active(1)).await;
        assert_eq!(cached_version(&registry, 2).await, Some(1));
    }
}
