//! Aggregate statistics for an evaluation run

use diffy_model::{DifferenceKind, DifferenceResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Leaf fields whose differences do not fail a request by default
pub const DEFAULT_IGNORABLE_FIELDS: [&str; 5] =
    ["timestamp", "request_id", "req_id", "created_at", "updated_at"];

/// Summary tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryOptions {
    /// Leaf keys whose differences still count as a pass
    pub ignorable_fields: BTreeSet<String>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            ignorable_fields: DEFAULT_IGNORABLE_FIELDS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Difference counts for one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSummary {
    /// Field path (text form)
    pub path: String,
    /// Differences at this path
    pub total: usize,
    /// Differences at this path by kind
    pub by_kind: BTreeMap<DifferenceKind, usize>,
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run summarized
    pub run_id: String,
    /// Requests analyzed
    pub total_requests: usize,
    /// Differences across all requests
    pub total_differences: usize,
    /// Requests with no differences, or only ignorable ones
    pub requests_passed: usize,
    /// `requests_passed / total_requests`, 0 for an empty run
    pub pass_rate: f64,
    /// Differences by kind
    pub kind_counts: BTreeMap<DifferenceKind, usize>,
    /// Per-path counts, most frequent first
    pub field_summary: Vec<FieldSummary>,
    /// Span between the first and last capture
    pub duration_ms: i64,
    /// Results analyzed with stale or missing configuration
    pub stale_config_results: usize,
}

impl RunSummary {
    /// Summarize the results of one run
    #[must_use]
    pub fn from_results<'a>(
        run_id: impl Into<String>,
        results: impl IntoIterator<Item = &'a DifferenceResult>,
        options: &SummaryOptions,
    ) -> Self {
        let mut summary = Self {
            run_id: run_id.into(),
            total_requests: 0,
            total_differences: 0,
            requests_passed: 0,
            pass_rate: 0.0,
            kind_counts: BTreeMap::new(),
            field_summary: Vec::new(),
            duration_ms: 0,
            stale_config_results: 0,
        };
        let mut fields: BTreeMap<String, FieldSummary> = BTreeMap::new();
        let mut span: Option<(i64, i64)> = None;

        for result in results {
            summary.total_requests += 1;
            summary.total_differences += result.differences().len();
            if passes(result, options) {
                summary.requests_passed += 1;
            }
            if result.config().status.is_degraded() {
                summary.stale_config_results += 1;
            }
            let ts = result.timestamp_msec();
            span = Some(span.map_or((ts, ts), |(lo, hi)| (lo.min(ts), hi.max(ts))));

            for diff in result.differences() {
                *summary.kind_counts.entry(diff.kind).or_default() += 1;
                let path = diff.path.to_string();
                let field = fields.entry(path.clone()).or_insert_with(|| FieldSummary {
                    path,
                    total: 0,
                    by_kind: BTreeMap::new(),
                });
                field.total += 1;
                *field.by_kind.entry(diff.kind).or_default() += 1;
            }
        }

        if summary.total_requests > 0 {
            #[allow(clippy::cast_precision_loss)]
            let rate = summary.requests_passed as f64 / summary.total_requests as f64;
            summary.pass_rate = rate;
        }
        summary.duration_ms = span.map_or(0, |(lo, hi)| hi.saturating_sub(lo));
        summary.field_summary = fields.into_values().collect();
        // Stable sort keeps path order among equal totals
        summary
            .field_summary
            .sort_by(|a, b| b.total.cmp(&a.total));
        summary
    }

    /// Plain-text report
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "run {}", self.run_id);
        let _ = writeln!(
            out,
            "  requests: {}  passed: {} ({:.1}%)  differences: {}",
            self.total_requests,
            self.requests_passed,
            self.pass_rate * 100.0,
            self.total_differences
        );
        let _ = writeln!(out, "  duration: {}ms", self.duration_ms);
        if self.stale_config_results > 0 {
            let _ = writeln!(
                out,
                "  analyzed with stale or missing configuration: {}",
                self.stale_config_results
            );
        }
        if !self.kind_counts.is_empty() {
            let _ = writeln!(out, "  by kind:");
            for (kind, count) in &self.kind_counts {
                let _ = writeln!(out, "    {kind}: {count}");
            }
        }
        if !self.field_summary.is_empty() {
            let _ = writeln!(out, "  by field:");
            for field in &self.field_summary {
                let path = if field.path.is_empty() {
                    "<root>"
                } else {
                    field.path.as_str()
                };
                let _ = writeln!(out, "    {path}: {}", field.total);
            }
        }
        out
    }
}

fn passes(result: &DifferenceResult, options: &SummaryOptions) -> bool {
    result.differences().iter().all(|diff| {
        !diff.is_synthetic()
            && diff
                .path
                .leaf_key()
                .is_some_and(|key| options.ignorable_fields.contains(key))
    })
}
