//! services/api/src/web/source_cache.rs
//!
//! Process-wide cache for the minimum enabled-source score threshold.
//!
//! The threshold is runtime configuration, so it cannot be baked in at
//! startup, but re-reading source_rules on every sighting batch is wasted
//! round-trips. The cache holds `{value, fetched_at}` with a max-age policy
//! and an explicit invalidation hook the admin source-rule handlers call on
//! every mutation. It is populated on first use and is never silently stale
//! beyond its TTL.

use slanglab_core::monitoring::min_enabled_score;
use slanglab_core::ports::{DirectoryService, PortResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::error::ApiError;

struct CachedThreshold {
    value: u8,
    fetched_at: Instant,
}

pub struct SourceThresholdCache {
    inner: RwLock<Option<CachedThreshold>>,
    max_age: Duration,
}

impl SourceThresholdCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            inner: RwLock::new(None),
            max_age,
        }
    }

    /// Returns the minimum score across enabled sources, refreshing from the
    /// store when the cached value is missing or older than the max age.
    ///
    /// No enabled sources is a configuration error: there is no safe
    /// permissive fallback for a quality floor, so the caller must refuse
    /// to run the operation that needed it.
    pub async fn min_enabled_score(
        &self,
        directory: &Arc<dyn DirectoryService>,
    ) -> Result<u8, ApiError> {
        if let Some(value) = self.fresh_value().await {
            return Ok(value);
        }

        let rules = self.load_rules(directory).await?;
        match min_enabled_score(&rules) {
            Some(value) => {
                let mut guard = self.inner.write().await;
                *guard = Some(CachedThreshold {
                    value,
                    fetched_at: Instant::now(),
                });
                Ok(value)
            }
            None => {
                error!("source_rules has no enabled sources; refusing to accept sightings");
                Err(ApiError::Configuration(
                    "no enabled source rules".to_string(),
                ))
            }
        }
    }

    /// Drops the cached value. Called by the admin handlers whenever a
    /// source rule changes, so the next read refetches.
    pub async fn invalidate(&self) {
        let mut guard = self.inner.write().await;
        if guard.take().is_some() {
            info!("Source threshold cache invalidated");
        }
    }

    async fn fresh_value(&self) -> Option<u8> {
        let guard = self.inner.read().await;
        guard
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.max_age)
            .map(|cached| cached.value)
    }

    async fn load_rules(
        &self,
        directory: &Arc<dyn DirectoryService>,
    ) -> PortResult<Vec<slanglab_core::domain::SourceRule>> {
        directory.list_source_rules().await
    }
}
