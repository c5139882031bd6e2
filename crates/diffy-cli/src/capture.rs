//! Capture file records
//!
//! One JSON object per line. Payloads may be given as strings holding the
//! raw response body, or inline as JSON values:
//!
//! ```json
//! {"trace_id":"t1","endpoint":"/users/1","timestamp_msec":1,"primary":{"id":1},"secondary":{"id":1},"candidate":"{\"id\":2}"}
//! ```

use anyhow::{Context, Result};
use diffy_engine::AnalysisRequest;
use diffy_model::Responses;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Response or request body as captured
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// Raw body text
    Text(String),
    /// Inline JSON document
    Json(Value),
}

impl Payload {
    /// Body text handed to the analyzer
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Json(value) => value.to_string(),
        }
    }
}

/// One captured request
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureRecord {
    /// Result id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Run the capture belongs to; overridden by `--run-id`
    #[serde(default)]
    pub run_id: Option<String>,
    /// Trace identifier
    pub trace_id: String,
    /// Endpoint name
    pub endpoint: String,
    /// Capture time (milliseconds since the Unix epoch)
    pub timestamp_msec: i64,
    /// Inbound request
    #[serde(default)]
    pub request: Option<Payload>,
    /// Primary response
    pub primary: Payload,
    /// Secondary response
    pub secondary: Payload,
    /// Candidate response
    pub candidate: Payload,
}

impl CaptureRecord {
    /// Convert into an analysis request
    ///
    /// `run_id` wins over the record's own run when given; `default_run`
    /// applies when neither is set.
    #[must_use]
    pub fn into_request(self, run_id: Option<&str>, default_run: &str) -> AnalysisRequest {
        let run = run_id
            .map(str::to_string)
            .or(self.run_id)
            .unwrap_or_else(|| default_run.to_string());
        let mut request = AnalysisRequest::new(
            run,
            self.trace_id,
            self.endpoint,
            self.timestamp_msec,
            Responses::new(
                self.primary.into_text(),
                self.secondary.into_text(),
                self.candidate.into_text(),
            ),
        );
        request.id = self.id;
        request.request = self.request.map(Payload::into_text);
        request
    }
}

/// Capture line that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number
    pub line: usize,
    /// Parse error
    pub reason: String,
}

/// Parsed capture file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captures {
    /// Well-formed records, in file order
    pub records: Vec<CaptureRecord>,
    /// Malformed lines, in file order
    pub skipped: Vec<SkippedLine>,
}

/// Parse capture lines, skipping blank ones
///
/// A malformed line is logged with `source` and its line number and set
/// aside; the remaining lines are still parsed.
#[must_use]
pub fn parse_captures(text: &str, source: &str) -> Captures {
    let mut captures = Captures::default();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => captures.records.push(record),
            Err(err) => {
                tracing::warn!(source, line = n + 1, error = %err, "skipping malformed capture record");
                captures.skipped.push(SkippedLine {
                    line: n + 1,
                    reason: err.to_string(),
                });
            }
        }
    }
    captures
}

/// Read a capture file
///
/// # Errors
/// Fails if the file cannot be read
pub async fn read_captures(path: &Path) -> Result<Captures> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read captures from {}", path.display()))?;
    Ok(parse_captures(&text, &path.display().to_string()))
}
