//! Testing utilities for the diffy workspace
//!
//! Shared fixtures for requests, rules, snapshots and results.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

use diffy_engine::{
    AnalysisRequest, CompiledTransform, ConfigSnapshot, PipelineRuntime, TransformError,
    TransformRuntime,
};
use diffy_model::{
    DifferenceKind, DifferenceResult, FieldDifference, NoiseRule, Responses, Transformation,
};
use serde_json::Value;

pub const TEST_RUN: &str = "run-test";
pub const TEST_TRACE: &str = "trace-test";
pub const TEST_TIMESTAMP: i64 = 1_700_000_000_000;

pub fn responses(primary: &str, secondary: &str, candidate: &str) -> Responses {
    Responses::new(primary, secondary, candidate)
}

pub fn request(endpoint: &str, primary: &str, secondary: &str, candidate: &str) -> AnalysisRequest {
    AnalysisRequest::new(
        TEST_RUN,
        TEST_TRACE,
        endpoint,
        TEST_TIMESTAMP,
        responses(primary, secondary, candidate),
    )
}

pub fn request_json(
    endpoint: &str,
    primary: &Value,
    secondary: &Value,
    candidate: &Value,
) -> AnalysisRequest {
    request(
        endpoint,
        &primary.to_string(),
        &secondary.to_string(),
        &candidate.to_string(),
    )
}

pub fn noise_rule(endpoint: &str, patterns: &[&str]) -> NoiseRule {
    NoiseRule::new(
        endpoint,
        patterns.iter().map(|p| p.parse().unwrap()).collect(),
    )
}

pub fn transformation(injection_point: &str, source: &str) -> Transformation {
    Transformation::new(injection_point.parse().unwrap(), source)
}

/// Snapshot compiled with the built-in pipeline runtime
pub fn snapshot(noise: Vec<NoiseRule>, transformations: &[Transformation]) -> ConfigSnapshot {
    ConfigSnapshot::build(noise, transformations, &PipelineRuntime)
}

pub fn difference(path: &str, kind: DifferenceKind) -> FieldDifference {
    FieldDifference::new(path.parse().unwrap(), kind, "x != y")
}

pub fn result(id: &str, run_id: &str, timestamp_msec: i64) -> DifferenceResult {
    DifferenceResult::builder(id, run_id, TEST_TRACE, "/test", timestamp_msec)
        .responses(responses("{}", "{}", "{}"))
        .build()
}

pub fn result_with(
    id: &str,
    run_id: &str,
    timestamp_msec: i64,
    differences: Vec<FieldDifference>,
) -> DifferenceResult {
    DifferenceResult::builder(id, run_id, TEST_TRACE, "/test", timestamp_msec)
        .responses(responses("{}", "{}", "{}"))
        .differences(differences)
        .build()
}

/// `path: description` for every difference, for compact assertions
pub fn described(result: &DifferenceResult) -> Vec<String> {
    result
        .differences()
        .iter()
        .map(|d| format!("{}: {}", d.path, d.description))
        .collect()
}

/// Runtime whose transforms always panic
#[derive(Debug, Default)]
pub struct PanickingRuntime;

#[derive(Debug)]
struct PanickingTransform(String);

impl CompiledTransform for PanickingTransform {
    fn apply(&self, _value: &Value) -> Result<Value, TransformError> {
        panic!("{}", self.0)
    }

    fn describe(&self) -> String {
        format!("panic({})", self.0)
    }
}

impl TransformRuntime for PanickingRuntime {
    fn name(&self) -> &str {
        "panicking"
    }

    fn compile(&self, source: &str) -> Result<Box<dyn CompiledTransform>, TransformError> {
        Ok(Box::new(PanickingTransform(source.to_string())))
    }
}
