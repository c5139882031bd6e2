//! The unit of record for one analyzed request

use crate::difference::{DifferenceKind, FieldDifference};
use crate::path::FieldPath;
use crate::rule::{InjectionPoint, Role};
use crate::snapshot::SnapshotId;
use serde::{Deserialize, Serialize};

/// Raw payloads from the three service variants, kept verbatim for audit
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Responses {
    /// Production baseline payload
    pub primary: String,
    /// Second baseline payload
    pub secondary: String,
    /// Candidate payload
    pub candidate: String,
}

impl Responses {
    /// Create from the three payloads
    #[inline]
    #[must_use]
    pub fn new(
        primary: impl Into<String>,
        secondary: impl Into<String>,
        candidate: impl Into<String>,
    ) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
            candidate: candidate.into(),
        }
    }

    /// Payload for a role
    #[inline]
    #[must_use]
    pub fn get(&self, role: Role) -> &str {
        match role {
            Role::Primary => &self.primary,
            Role::Secondary => &self.secondary,
            Role::Candidate => &self.candidate,
        }
    }
}

/// Freshness of the configuration an analysis ran with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigStatus {
    /// Read from the configuration stores
    #[default]
    Fresh,
    /// Stores were unavailable; last known-good configuration was used
    Stale,
    /// Stores were unavailable and nothing was cached; no rules applied
    Missing,
}

impl ConfigStatus {
    /// Check if the analysis ran without fresh configuration
    #[inline]
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        !matches!(self, Self::Fresh)
    }
}

/// Which configuration snapshot produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigProvenance {
    /// Content hash of the snapshot
    pub snapshot_id: SnapshotId,
    /// Freshness at analysis time
    pub status: ConfigStatus,
}

impl Default for ConfigProvenance {
    fn default() -> Self {
        Self {
            snapshot_id: SnapshotId::empty(),
            status: ConfigStatus::Fresh,
        }
    }
}

/// Kind of a [`Diagnostic`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Transformation source did not compile; it was skipped
    TransformCompileFailed,
    /// Transformation failed on a field; the untransformed value was used
    TransformFailed,
    /// Transformation is not side-effect-free; the untransformed value was used
    UnsupportedImpureTransform,
}

/// Non-fatal problem recorded during analysis
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    /// What happened
    pub kind: DiagnosticKind,
    /// Transformation involved
    pub injection_point: InjectionPoint,
    /// Response role, when the problem is tied to one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Field, when the problem is tied to one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<FieldPath>,
    /// Details
    pub message: String,
}

/// Outcome of analyzing one request
///
/// Built once by the analyzer and never mutated afterwards; fields are only
/// readable through accessors.
///
/// # Invariants
/// - `differences` contains no entry suppressed by the noise rules of the
///   snapshot named in `config`
/// - `responses` holds the untransformed payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferenceResult {
    id: String,
    run_id: String,
    trace_id: String,
    endpoint: String,
    timestamp_msec: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request: Option<String>,
    responses: Responses,
    differences: Vec<FieldDifference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<Diagnostic>,
    #[serde(default)]
    config: ConfigProvenance,
}

impl DifferenceResult {
    /// Start building a result
    #[inline]
    #[must_use]
    pub fn builder(
        id: impl Into<String>,
        run_id: impl Into<String>,
        trace_id: impl Into<String>,
        endpoint: impl Into<String>,
        timestamp_msec: i64,
    ) -> DifferenceResultBuilder {
        DifferenceResultBuilder::new(id, run_id, trace_id, endpoint, timestamp_msec)
    }

    /// Unique identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Grouping key of the evaluation run
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Trace identifier of the inbound request
    #[inline]
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Endpoint name
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Capture timestamp (milliseconds since the Unix epoch)
    #[inline]
    #[must_use]
    pub fn timestamp_msec(&self) -> i64 {
        self.timestamp_msec
    }

    /// Serialized inbound request, if captured
    #[inline]
    #[must_use]
    pub fn request(&self) -> Option<&str> {
        self.request.as_deref()
    }

    /// Untransformed payloads
    #[inline]
    #[must_use]
    pub fn responses(&self) -> &Responses {
        &self.responses
    }

    /// Surviving differences in traversal order
    #[inline]
    #[must_use]
    pub fn differences(&self) -> &[FieldDifference] {
        &self.differences
    }

    /// Diagnostics recorded during analysis
    #[inline]
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Configuration provenance
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ConfigProvenance {
        &self.config
    }

    /// Check if the candidate matched the baselines
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.differences.is_empty()
    }

    /// Check if the result carries a synthetic failure difference
    #[must_use]
    pub fn has_failure(&self) -> bool {
        self.differences.iter().any(FieldDifference::is_synthetic)
    }

    /// Count differences of one kind
    #[must_use]
    pub fn count_kind(&self, kind: DifferenceKind) -> usize {
        self.differences.iter().filter(|d| d.kind == kind).count()
    }
}

/// Builder for [`DifferenceResult`]
///
/// Identity and grouping fields are required up front; payloads, differences,
/// diagnostics and provenance default to empty.
#[derive(Debug, Clone)]
pub struct DifferenceResultBuilder {
    inner: DifferenceResult,
}

impl DifferenceResultBuilder {
    /// Create builder
    #[inline]
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        run_id: impl Into<String>,
        trace_id: impl Into<String>,
        endpoint: impl Into<String>,
        timestamp_msec: i64,
    ) -> Self {
        Self {
            inner: DifferenceResult {
                id: id.into(),
                run_id: run_id.into(),
                trace_id: trace_id.into(),
                endpoint: endpoint.into(),
                timestamp_msec,
                request: None,
                responses: Responses::default(),
                differences: Vec::new(),
                diagnostics: Vec::new(),
                config: ConfigProvenance::default(),
            },
        }
    }

    /// Set serialized request
    #[inline]
    #[must_use]
    pub fn request(mut self, request: Option<String>) -> Self {
        self.inner.request = request;
        self
    }

    /// Set raw responses
    #[inline]
    #[must_use]
    pub fn responses(mut self, responses: Responses) -> Self {
        self.inner.responses = responses;
        self
    }

    /// Set differences
    #[inline]
    #[must_use]
    pub fn differences(mut self, differences: Vec<FieldDifference>) -> Self {
        self.inner.differences = differences;
        self
    }

    /// Set diagnostics
    #[inline]
    #[must_use]
    pub fn diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.inner.diagnostics = diagnostics;
        self
    }

    /// Set configuration provenance
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ConfigProvenance) -> Self {
        self.inner.config = config;
        self
    }

    /// Finish the result
    #[inline]
    #[must_use]
    pub fn build(self) -> DifferenceResult {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> DifferenceResult {
        DifferenceResult::builder("r-1", "run-1", "trace-1", "/users/1", 1_700_000_000_000)
            .responses(Responses::new("{}", "{}", r#"{"a":1}"#))
            .differences(vec![FieldDifference::new(
                "a".parse().unwrap(),
                DifferenceKind::ExtraField,
                "field only in candidate",
            )])
            .build()
    }

    #[test]
    fn builder_sets_all_fields() {
        let result = sample();
        assert_eq!(result.id(), "r-1");
        assert_eq!(result.run_id(), "run-1");
        assert_eq!(result.trace_id(), "trace-1");
        assert_eq!(result.endpoint(), "/users/1");
        assert_eq!(result.timestamp_msec(), 1_700_000_000_000);
        assert_eq!(result.request(), None);
        assert_eq!(result.responses().get(Role::Candidate), r#"{"a":1}"#);
        assert_eq!(result.count_kind(DifferenceKind::ExtraField), 1);
        assert!(!result.is_clean());
        assert!(!result.has_failure());
        assert_eq!(result.config().status, ConfigStatus::Fresh);
    }

    #[test]
    fn builder_defaults() {
        let result = DifferenceResult::builder("r-2", "run", "t", "/e", 0).build();
        assert!(result.is_clean());
        assert!(result.diagnostics().is_empty());
        assert_eq!(result.responses(), &Responses::default());
        assert_eq!(result.config(), &ConfigProvenance::default());
    }

    #[test]
    fn result_serde_round_trip() {
        let result = sample();
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("diagnostics"));
        let back: DifferenceResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn config_status_degraded() {
        assert!(!ConfigStatus::Fresh.is_degraded());
        assert!(ConfigStatus::Stale.is_degraded());
        assert!(ConfigStatus::Missing.is_degraded());
    }
}
