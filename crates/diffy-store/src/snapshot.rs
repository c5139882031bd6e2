//! Configuration snapshots per endpoint
//!
//! Snapshots are served from a TTL cache. When the backing stores fail, the
//! provider falls back to the last snapshot it loaded for the endpoint
//! (marked [`ConfigStatus::Stale`]) or to an empty snapshot (marked
//! [`ConfigStatus::Missing`]). Fallbacks are never cached, so the next call
//! retries the stores.

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::noise::NoiseConfigStore;
use crate::transformation::TransformationConfigStore;
use dashmap::DashMap;
use diffy_engine::{ConfigSnapshot, TransformRuntime};
use diffy_model::{ConfigStatus, NoiseRule};
use futures::future::join_all;
use moka::future::Cache;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Cached source of configuration snapshots
pub struct SnapshotProvider {
    noise: Arc<dyn NoiseConfigStore>,
    transformations: Arc<dyn TransformationConfigStore>,
    runtime: Arc<dyn TransformRuntime>,
    cache: Cache<String, Arc<ConfigSnapshot>>,
    last_good: DashMap<String, Arc<ConfigSnapshot>>,
}

impl fmt::Debug for SnapshotProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotProvider")
            .field("runtime", &self.runtime.name())
            .field("cached", &self.cache.entry_count())
            .field("last_good", &self.last_good.len())
            .finish_non_exhaustive()
    }
}

impl SnapshotProvider {
    /// Create provider over the given stores
    #[must_use]
    pub fn new(
        noise: Arc<dyn NoiseConfigStore>,
        transformations: Arc<dyn TransformationConfigStore>,
        runtime: Arc<dyn TransformRuntime>,
        config: &StoreConfig,
    ) -> Self {
        Self {
            noise,
            transformations,
            runtime,
            cache: Cache::builder()
                .max_capacity(config.snapshot_capacity)
                .time_to_live(config.snapshot_ttl())
                .build(),
            last_good: DashMap::new(),
        }
    }

    /// Snapshot for `endpoint`
    ///
    /// Never fails; check [`ConfigSnapshot::status`] for degraded results.
    /// Concurrent misses for one endpoint share a single load.
    pub async fn snapshot_for(&self, endpoint: &str) -> Arc<ConfigSnapshot> {
        match self
            .cache
            .try_get_with_by_ref(endpoint, self.load(endpoint))
            .await
        {
            Ok(snapshot) => snapshot,
            Err(err) => self.fallback(endpoint, &err),
        }
    }

    /// Snapshots for several endpoints, resolved together
    pub async fn snapshots_for<'a>(
        &self,
        endpoints: impl IntoIterator<Item = &'a str>,
    ) -> HashMap<String, Arc<ConfigSnapshot>> {
        let endpoints: Vec<&str> = endpoints.into_iter().collect();
        let snapshots = join_all(endpoints.iter().map(|e| self.snapshot_for(e))).await;
        endpoints
            .into_iter()
            .map(str::to_string)
            .zip(snapshots)
            .collect()
    }

    /// Drop the cached snapshot of `endpoint`
    pub async fn invalidate(&self, endpoint: &str) {
        self.cache.invalidate(endpoint).await;
    }

    /// Drop every cached snapshot
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    async fn load(&self, endpoint: &str) -> Result<Arc<ConfigSnapshot>, StoreError> {
        let patterns = self.noise.get_noise_rules(endpoint).await?;
        let transformations = self.transformations.list().await?;
        let rules = if patterns.is_empty() {
            Vec::new()
        } else {
            vec![NoiseRule::new(endpoint, patterns)]
        };

        let snapshot = Arc::new(ConfigSnapshot::build(
            rules,
            &transformations,
            self.runtime.as_ref(),
        ));
        tracing::debug!(
            endpoint,
            snapshot = %snapshot.id().short(),
            transformations = snapshot.transformations().len(),
            "configuration snapshot loaded"
        );
        self.last_good
            .insert(endpoint.to_string(), Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn fallback(&self, endpoint: &str, err: &StoreError) -> Arc<ConfigSnapshot> {
        if let Some(good) = self.last_good.get(endpoint) {
            tracing::warn!(
                endpoint,
                error = %err,
                snapshot = %good.id().short(),
                "configuration lookup failed, using last known good snapshot"
            );
            return Arc::new(ConfigSnapshot::clone(&good).with_status(ConfigStatus::Stale));
        }
        tracing::warn!(
            endpoint,
            error = %err,
            "configuration lookup failed, analyzing without configuration"
        );
        Arc::new(ConfigSnapshot::empty().with_status(ConfigStatus::Missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::{InMemoryNoiseStore, MockNoiseConfigStore};
    use crate::transformation::{InMemoryTransformationStore, MockTransformationConfigStore};
    use diffy_engine::PipelineRuntime;
    use diffy_model::{DiagnosticKind, Transformation};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn provider(
        noise: impl NoiseConfigStore + 'static,
        transformations: impl TransformationConfigStore + 'static,
    ) -> SnapshotProvider {
        SnapshotProvider::new(
            Arc::new(noise),
            Arc::new(transformations),
            Arc::new(PipelineRuntime::new()),
            &StoreConfig::default(),
        )
    }

    /// Noise store that answers once, then fails
    fn flaky_noise(calls: Arc<AtomicUsize>) -> MockNoiseConfigStore {
        let mut noise = MockNoiseConfigStore::new();
        noise.expect_get_noise_rules().returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(vec!["ts".parse().unwrap()])
            } else {
                Err(StoreError::unavailable("connection refused"))
            }
        });
        noise
    }

    #[tokio::test]
    async fn test_snapshot_contains_endpoint_rules() {
        let noise = InMemoryNoiseStore::new();
        noise
            .set_noise_rules("/e", vec!["ts".parse().unwrap()])
            .await
            .unwrap();
        let transformations = InMemoryTransformationStore::from_transformations([
            Transformation::new("all:name".parse().unwrap(), "lower"),
        ]);
        let provider = provider(noise, transformations);

        let snapshot = provider.snapshot_for("/e").await;
        assert_eq!(snapshot.status(), ConfigStatus::Fresh);
        assert_eq!(snapshot.noise_rules().len(), 1);
        assert_eq!(snapshot.transformations().len(), 1);

        let other = provider.snapshot_for("/other").await;
        assert!(other.noise_rules().is_empty());
        assert_ne!(other.id(), snapshot.id());
    }

    #[tokio::test]
    async fn test_snapshot_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = provider(
            flaky_noise(Arc::clone(&calls)),
            InMemoryTransformationStore::new(),
        );

        let first = provider.snapshot_for("/e").await;
        let second = provider.snapshot_for("/e").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_store_failure_falls_back_to_last_good() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = provider(
            flaky_noise(Arc::clone(&calls)),
            InMemoryTransformationStore::new(),
        );

        let fresh = provider.snapshot_for("/e").await;
        provider.invalidate("/e").await;
        let stale = provider.snapshot_for("/e").await;

        assert_eq!(stale.status(), ConfigStatus::Stale);
        assert_eq!(stale.id(), fresh.id());
        assert_eq!(stale.noise_rules(), fresh.noise_rules());

        // Fallbacks are not cached
        let _ = provider.snapshot_for("/e").await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_store_failure_without_history_is_missing() {
        let mut transformations = MockTransformationConfigStore::new();
        transformations
            .expect_list()
            .returning(|| Err(StoreError::unavailable("timeout")));
        let provider = provider(InMemoryNoiseStore::new(), transformations);

        let snapshot = provider.snapshot_for("/e").await;
        assert_eq!(snapshot.status(), ConfigStatus::Missing);
        assert!(snapshot.noise_rules().is_empty());
        assert!(snapshot.transformations().is_empty());
    }

    #[tokio::test]
    async fn test_compile_failures_surface_as_diagnostics() {
        let transformations = InMemoryTransformationStore::from_transformations([
            Transformation::new("all:a".parse().unwrap(), "explode()"),
        ]);
        let provider = provider(InMemoryNoiseStore::new(), transformations);

        let snapshot = provider.snapshot_for("/e").await;
        assert_eq!(snapshot.status(), ConfigStatus::Fresh);
        assert_eq!(snapshot.diagnostics().len(), 1);
        assert_eq!(
            snapshot.diagnostics()[0].kind,
            DiagnosticKind::TransformCompileFailed
        );
    }

    #[tokio::test]
    async fn test_snapshots_for_resolves_each_endpoint() {
        let noise = InMemoryNoiseStore::new();
        noise
            .set_noise_rules("/a", vec!["x".parse().unwrap()])
            .await
            .unwrap();
        let provider = provider(noise, InMemoryTransformationStore::new());

        let snapshots = provider.snapshots_for(["/a", "/b"]).await;
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots["/a"].noise_rules().len(), 1);
        assert!(snapshots["/b"].noise_rules().is_empty());
    }
}
