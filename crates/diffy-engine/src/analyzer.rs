//! Three-way difference analysis
//!
//! For one captured request the analyzer parses the primary, secondary and
//! candidate responses, normalizes each with the snapshot's transformations,
//! compares primary against candidate (and against secondary to learn where
//! the baselines themselves disagree), drops noise and freezes the outcome in
//! a [`DifferenceResult`]. Analysis never fails: malformed payloads become a
//! synthetic difference and transformation problems become diagnostics.

use crate::config::{BaselineNoisePolicy, EngineConfig};
use crate::differ::StructuralDiffer;
use crate::error::EngineConfigError;
use crate::noise::NoiseFilter;
use crate::snapshot::ConfigSnapshot;
use crate::transform::FieldTransformer;
use diffy_model::{
    ConfigProvenance, Diagnostic, DifferenceResult, FieldDifference, FieldPath, Responses, Role,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

/// One captured request with the responses of all three variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Result identity; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Evaluation run the request belongs to
    pub run_id: String,
    /// Trace identifier of the inbound request
    pub trace_id: String,
    /// Endpoint name, used to select noise rules
    pub endpoint: String,
    /// Capture timestamp (milliseconds since the Unix epoch)
    pub timestamp_msec: i64,
    /// Serialized inbound request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    /// Raw response payloads
    pub responses: Responses,
}

impl AnalysisRequest {
    /// Create request without id or captured request body
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        trace_id: impl Into<String>,
        endpoint: impl Into<String>,
        timestamp_msec: i64,
        responses: Responses,
    ) -> Self {
        Self {
            id: None,
            run_id: run_id.into(),
            trace_id: trace_id.into(),
            endpoint: endpoint.into(),
            timestamp_msec,
            request: None,
            responses,
        }
    }

    /// Set result id
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set serialized inbound request
    #[inline]
    #[must_use]
    pub fn with_request(mut self, request: impl Into<String>) -> Self {
        self.request = Some(request.into());
        self
    }
}

struct Parsed {
    primary: Value,
    secondary: Value,
    candidate: Value,
}

/// Difference analyzer
///
/// Stateless apart from its configuration; share one instance across threads.
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: EngineConfig,
    differ: StructuralDiffer,
    transformer: FieldTransformer,
}

impl Default for Analyzer {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            differ: StructuralDiffer::from_config(&config),
            transformer: FieldTransformer::from_config(&config),
            config,
        }
    }
}

impl Analyzer {
    /// Create analyzer
    ///
    /// # Errors
    /// Returns [`EngineConfigError`] if the configuration is invalid
    pub fn new(config: EngineConfig) -> Result<Self, EngineConfigError> {
        config.validate()?;
        Ok(Self {
            differ: StructuralDiffer::from_config(&config),
            transformer: FieldTransformer::from_config(&config),
            config,
        })
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Analyze one request against `snapshot`
    #[must_use]
    pub fn analyze(&self, request: AnalysisRequest, snapshot: &ConfigSnapshot) -> DifferenceResult {
        self.analyze_ref(&request, snapshot)
    }

    pub(crate) fn analyze_ref(
        &self,
        request: &AnalysisRequest,
        snapshot: &ConfigSnapshot,
    ) -> DifferenceResult {
        let span = tracing::debug_span!(
            "analyze",
            endpoint = %request.endpoint,
            trace_id = %request.trace_id,
        );
        let _entered = span.enter();

        if snapshot.status().is_degraded() {
            tracing::warn!(
                status = ?snapshot.status(),
                snapshot = %snapshot.id().short(),
                "analyzing with degraded configuration"
            );
        }

        let mut diagnostics = snapshot.diagnostics().to_vec();
        let differences = match parse_responses(&request.responses) {
            Ok(parsed) => self.compare(&request.endpoint, parsed, snapshot, &mut diagnostics),
            Err(failure) => {
                tracing::warn!(description = %failure.description, "response parse failure");
                vec![failure]
            }
        };

        tracing::debug!(
            differences = differences.len(),
            diagnostics = diagnostics.len(),
            "analysis complete"
        );
        finish(request, differences, diagnostics, snapshot.provenance())
    }

    fn compare(
        &self,
        endpoint: &str,
        parsed: Parsed,
        snapshot: &ConfigSnapshot,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<FieldDifference> {
        let mut normalize = |value: Value, role: Role| {
            let outcome = self
                .transformer
                .transform(value, role, snapshot.transformations());
            diagnostics.extend(outcome.diagnostics);
            outcome.value
        };
        let primary = normalize(parsed.primary, Role::Primary);
        let secondary = normalize(parsed.secondary, Role::Secondary);
        let candidate = normalize(parsed.candidate, Role::Candidate);

        let baseline = self.differ.diff(&primary, &secondary);
        let mut reported = self.differ.diff(&primary, &candidate);
        tracing::debug!(
            baseline = baseline.len(),
            candidate = reported.len(),
            "responses compared"
        );

        if self.config.baseline_noise == BaselineNoisePolicy::SuppressBaselineDivergence
            && !baseline.is_empty()
        {
            let divergent: HashSet<&FieldPath> = baseline.iter().map(|d| &d.path).collect();
            reported.retain(|d| !divergent.contains(&d.path));
        }

        NoiseFilter::filter(endpoint, reported, snapshot.noise_rules())
    }
}

fn parse_responses(responses: &Responses) -> Result<Parsed, FieldDifference> {
    let mut failures = Vec::new();
    let mut parse = |role: Role| match serde_json::from_str::<Value>(responses.get(role)) {
        Ok(value) => Some(value),
        Err(err) => {
            failures.push(format!("{role}: {err}"));
            None
        }
    };
    let primary = parse(Role::Primary);
    let secondary = parse(Role::Secondary);
    let candidate = parse(Role::Candidate);

    match (primary, secondary, candidate) {
        (Some(primary), Some(secondary), Some(candidate)) => Ok(Parsed {
            primary,
            secondary,
            candidate,
        }),
        _ => Err(FieldDifference::parse_failure(format!(
            "unparseable response ({})",
            failures.join("; ")
        ))),
    }
}

pub(crate) fn finish(
    request: &AnalysisRequest,
    differences: Vec<FieldDifference>,
    diagnostics: Vec<Diagnostic>,
    provenance: ConfigProvenance,
) -> DifferenceResult {
    let id = request
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    DifferenceResult::builder(
        id,
        request.run_id.clone(),
        request.trace_id.clone(),
        request.endpoint.clone(),
        request.timestamp_msec,
    )
    .request(request.request.clone())
    .responses(request.responses.clone())
    .differences(differences)
    .diagnostics(diagnostics)
    .config(provenance)
    .build()
}
