//! Parallel analysis of many requests

use crate::analyzer::{finish, AnalysisRequest, Analyzer};
use crate::snapshot::ConfigSnapshot;
use crate::transform::panic_message;
use diffy_model::{DifferenceResult, FieldDifference};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

impl Analyzer {
    /// Analyze `requests` in parallel on the rayon pool
    ///
    /// `snapshot_for` maps an endpoint to its configuration snapshot. Output
    /// order matches input order. A request whose analysis panics yields a
    /// result with a single `AnalysisAborted` difference; the others are not
    /// affected.
    #[must_use]
    pub fn analyze_batch<F>(
        &self,
        requests: Vec<AnalysisRequest>,
        snapshot_for: F,
    ) -> Vec<DifferenceResult>
    where
        F: Fn(&str) -> Arc<ConfigSnapshot> + Sync,
    {
        let started = Instant::now();
        let results: Vec<DifferenceResult> = requests
            .par_iter()
            .map(|request| {
                let snapshot = snapshot_for(&request.endpoint);
                self.analyze_isolated(request, &snapshot)
            })
            .collect();

        tracing::info!(
            requests = results.len(),
            clean = results.iter().filter(|r| r.is_clean()).count(),
            aborted = results.iter().filter(|r| r.has_failure()).count(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "batch analyzed"
        );
        results
    }

    /// Analyze one request, turning a panic into an `AnalysisAborted` result
    #[must_use]
    pub fn analyze_isolated(
        &self,
        request: &AnalysisRequest,
        snapshot: &ConfigSnapshot,
    ) -> DifferenceResult {
        contain(request, snapshot, || self.analyze_ref(request, snapshot))
    }
}

fn contain(
    request: &AnalysisRequest,
    snapshot: &ConfigSnapshot,
    analysis: impl FnOnce() -> DifferenceResult,
) -> DifferenceResult {
    match panic::catch_unwind(AssertUnwindSafe(analysis)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                endpoint = %request.endpoint,
                trace_id = %request.trace_id,
                %message,
                "analysis panicked"
            );
            finish(
                request,
                vec![FieldDifference::analysis_aborted(message)],
                snapshot.diagnostics().to_vec(),
                snapshot.provenance(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diffy_model::{DifferenceKind, NoiseRule, Responses};
    use std::collections::HashMap;

    fn request(endpoint: &str, trace: &str, candidate: &str) -> AnalysisRequest {
        AnalysisRequest::new(
            "run",
            trace,
            endpoint,
            0,
            Responses::new(r#"{"ts":1,"v":1}"#, r#"{"ts":1,"v":1}"#, candidate),
        )
    }

    #[test]
    fn batch_preserves_order_and_uses_endpoint_snapshot() {
        let mut snapshots = HashMap::new();
        snapshots.insert(
            "/noisy".to_string(),
            Arc::new(ConfigSnapshot::build(
                vec![NoiseRule::new("/noisy", vec!["ts".parse().unwrap()])],
                &[],
                &crate::transform::PipelineRuntime,
            )),
        );
        let empty = Arc::new(ConfigSnapshot::empty());
        let requests: Vec<_> = (0..64)
            .map(|i| {
                let endpoint = if i % 2 == 0 { "/noisy" } else { "/plain" };
                request(endpoint, &format!("t{i}"), r#"{"ts":2,"v":1}"#)
            })
            .collect();

        let results = Analyzer::default().analyze_batch(requests, |endpoint| {
            snapshots.get(endpoint).cloned().unwrap_or_else(|| empty.clone())
        });

        assert_eq!(results.len(), 64);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.trace_id(), format!("t{i}"));
            assert_eq!(result.is_clean(), i % 2 == 0);
        }
    }

    #[test]
    fn batch_isolates_parse_failures() {
        let results = Analyzer::default().analyze_batch(
            vec![
                request("/e", "ok", r#"{"ts":1,"v":1}"#),
                request("/e", "bad", "{"),
                request("/e", "diff", r#"{"ts":1,"v":2}"#),
            ],
            |_| Arc::new(ConfigSnapshot::empty()),
        );
        assert!(results[0].is_clean());
        assert_eq!(results[1].differences()[0].kind, DifferenceKind::ParseFailure);
        assert_eq!(results[2].differences().len(), 1);
    }

    #[test]
    fn contain_turns_panic_into_aborted_result() {
        let req = request("/e", "t", "{}").with_id("r-1");
        let snapshot = ConfigSnapshot::empty();
        let result = contain(&req, &snapshot, || panic!("index out of bounds"));
        assert_eq!(result.id(), "r-1");
        assert_eq!(result.differences().len(), 1);
        let diff = &result.differences()[0];
        assert_eq!(diff.kind, DifferenceKind::AnalysisAborted);
        assert_eq!(diff.description, "analysis aborted: index out of bounds");
        assert!(result.has_failure());
    }
}
