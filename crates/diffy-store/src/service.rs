//! Analysis service
//!
//! Resolves the configuration snapshot, runs the analyzer and persists the
//! result. Analysis is CPU-bound and runs on tokio's blocking pool, off the
//! async workers. Analysis itself cannot fail; only persistence can, and a
//! persistence failure hands the computed result back in the error.

use crate::error::{ServiceError, StoreError};
use crate::result::ResultStore;
use crate::snapshot::SnapshotProvider;
use diffy_engine::{AnalysisRequest, Analyzer, ConfigSnapshot};
use diffy_model::{ConfigStatus, DifferenceResult};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Snapshot, analyze, save
#[derive(Clone)]
pub struct AnalysisService {
    analyzer: Arc<Analyzer>,
    snapshots: Arc<SnapshotProvider>,
    results: Arc<dyn ResultStore>,
}

impl fmt::Debug for AnalysisService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisService")
            .field("analyzer", &self.analyzer)
            .field("snapshots", &self.snapshots)
            .finish_non_exhaustive()
    }
}

impl AnalysisService {
    /// Create service
    #[must_use]
    pub fn new(
        analyzer: Analyzer,
        snapshots: Arc<SnapshotProvider>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            analyzer: Arc::new(analyzer),
            snapshots,
            results,
        }
    }

    /// Analyzer used by the service
    #[inline]
    #[must_use]
    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Result store used by the service
    #[inline]
    #[must_use]
    pub fn results(&self) -> &dyn ResultStore {
        self.results.as_ref()
    }

    /// Analyze one request and persist the result
    ///
    /// Dropping the future before the save completes leaves nothing stored.
    ///
    /// # Errors
    /// Returns [`ServiceError::Persistence`] carrying the result if it could
    /// not be saved, or [`ServiceError::Aborted`] if the analysis task did not
    /// complete
    pub async fn process(&self, request: AnalysisRequest) -> Result<DifferenceResult, ServiceError> {
        let snapshot = self.snapshots.snapshot_for(&request.endpoint).await;
        let analyzer = Arc::clone(&self.analyzer);
        let result =
            tokio::task::spawn_blocking(move || analyzer.analyze_isolated(&request, &snapshot))
                .await
                .map_err(|err| ServiceError::Aborted(join_failure(&err)))?;
        self.persist(result).await
    }

    /// Analyze many requests and persist each result
    ///
    /// Each endpoint's snapshot is resolved once before analysis starts, so
    /// configuration changes during the batch do not mix. Outcomes are in
    /// input order.
    pub async fn process_batch(
        &self,
        requests: Vec<AnalysisRequest>,
    ) -> Vec<Result<DifferenceResult, ServiceError>> {
        let endpoints: BTreeSet<&str> = requests.iter().map(|r| r.endpoint.as_str()).collect();
        let snapshots = self.snapshots.snapshots_for(endpoints).await;

        let count = requests.len();
        let analyzer = Arc::clone(&self.analyzer);
        let analyzed = tokio::task::spawn_blocking(move || {
            analyzer.analyze_batch(requests, |endpoint| {
                snapshots.get(endpoint).cloned().unwrap_or_else(|| {
                    Arc::new(ConfigSnapshot::empty().with_status(ConfigStatus::Missing))
                })
            })
        })
        .await;

        match analyzed {
            Ok(results) => join_all(results.into_iter().map(|result| self.persist(result))).await,
            Err(err) => {
                let message = join_failure(&err);
                (0..count)
                    .map(|_| Err(ServiceError::Aborted(message.clone())))
                    .collect()
            }
        }
    }

    async fn persist(&self, result: DifferenceResult) -> Result<DifferenceResult, ServiceError> {
        match self.results.save(&result).await {
            Ok(()) => Ok(result),
            Err(source) => {
                tracing::error!(
                    id = result.id(),
                    endpoint = result.endpoint(),
                    error = %source,
                    "failed to persist result"
                );
                Err(persistence(result, source))
            }
        }
    }
}

fn join_failure(err: &tokio::task::JoinError) -> String {
    tracing::error!(error = %err, "analysis task aborted");
    err.to_string()
}

fn persistence(result: DifferenceResult, source: StoreError) -> ServiceError {
    ServiceError::Persistence {
        result: Box::new(result),
        source,
    }
}
