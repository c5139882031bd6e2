//! Subcommand implementations

use crate::capture::read_captures;
use crate::config::{ConfigIssue, DiffyConfig};
use anyhow::{bail, Context, Result};
use diffy_engine::{Analyzer, PipelineRuntime, RunSummary};
use diffy_model::DifferenceResult;
use diffy_store::{
    AnalysisService, InMemoryNoiseStore, InMemoryTransformationStore, JsonlResultStore,
    ResultStore, SnapshotProvider,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Arguments of `diffy analyze`
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    /// Capture file
    pub input: PathBuf,
    /// Result file, appended to
    pub output: PathBuf,
    /// Configuration file
    pub config: Option<PathBuf>,
    /// Run id applied to every capture; captures without one get a fresh id
    pub run_id: Option<String>,
}

/// Outcome of `diffy analyze`
#[derive(Debug, Clone)]
pub struct AnalyzeReport {
    /// Summary of the analyzed captures
    pub summary: RunSummary,
    /// Results that could not be written
    pub unsaved: usize,
    /// Malformed capture lines left out of the analysis
    pub skipped: usize,
}

fn load_config(path: Option<&Path>) -> Result<DiffyConfig> {
    match path {
        Some(path) => Ok(DiffyConfig::load(path)?),
        None => Ok(DiffyConfig::default()),
    }
}

/// Analyze every capture in `args.input` and append the results to `args.output`
///
/// # Errors
/// Fails on unreadable input, invalid configuration, or if the result file
/// cannot be opened. Malformed capture lines are counted in
/// [`AnalyzeReport::skipped`] and results that fail to save in
/// [`AnalyzeReport::unsaved`].
pub async fn analyze(args: &AnalyzeArgs) -> Result<AnalyzeReport> {
    let config = load_config(args.config.as_deref())?;
    let analyzer = Analyzer::new(config.engine.clone()).context("invalid [engine] settings")?;
    let snapshots = Arc::new(SnapshotProvider::new(
        Arc::new(InMemoryNoiseStore::from_rules(config.noise_rules()?)),
        Arc::new(InMemoryTransformationStore::from_transformations(
            config.transformations()?,
        )),
        Arc::new(PipelineRuntime::new()),
        &config.store,
    ));
    let store = Arc::new(
        JsonlResultStore::open(&args.output)
            .await
            .with_context(|| format!("cannot open result file {}", args.output.display()))?,
    );
    let service = AnalysisService::new(analyzer, snapshots, store);

    let default_run = Uuid::new_v4().to_string();
    let captures = read_captures(&args.input).await?;
    let skipped = captures.skipped.len();
    let requests: Vec<_> = captures
        .records
        .into_iter()
        .map(|record| record.into_request(args.run_id.as_deref(), &default_run))
        .collect();
    tracing::info!(captures = requests.len(), skipped, "analyzing captures");

    let mut results: Vec<DifferenceResult> = Vec::with_capacity(requests.len());
    let mut unsaved = 0;
    for outcome in service.process_batch(requests).await {
        match outcome {
            Ok(result) => results.push(result),
            Err(err) => {
                tracing::error!(error = %err, "result not saved");
                unsaved += 1;
                results.extend(err.into_result());
            }
        }
    }

    let runs: BTreeSet<&str> = results.iter().map(DifferenceResult::run_id).collect();
    let label = args
        .run_id
        .clone()
        .unwrap_or_else(|| runs.into_iter().collect::<Vec<_>>().join(","));
    let summary = RunSummary::from_results(label, &results, &config.summary);
    Ok(AnalyzeReport {
        summary,
        unsaved,
        skipped,
    })
}

/// Arguments of `diffy summarize`
#[derive(Debug, Clone)]
pub struct SummarizeArgs {
    /// Result file
    pub results: PathBuf,
    /// Run to summarize
    pub run_id: String,
    /// Configuration file, for summary settings
    pub config: Option<PathBuf>,
}

/// Summarize one run from a result file
///
/// # Errors
/// Fails if the configuration or result file cannot be read
pub async fn summarize(args: &SummarizeArgs) -> Result<RunSummary> {
    let config = load_config(args.config.as_deref())?;
    if !args.results.exists() {
        bail!("result file {} does not exist", args.results.display());
    }
    let store = JsonlResultStore::open(&args.results)
        .await
        .with_context(|| format!("cannot open result file {}", args.results.display()))?;
    let results = store.find_by_run_id(&args.run_id).await?;
    if results.is_empty() {
        tracing::warn!(run_id = %args.run_id, "no results for run");
    }
    Ok(RunSummary::from_results(
        args.run_id.clone(),
        &results,
        &config.summary,
    ))
}

/// Problems found by `diffy check`
///
/// # Errors
/// Fails if the file cannot be read or parsed at all
pub fn check(config: &Path) -> Result<Vec<ConfigIssue>> {
    let config = DiffyConfig::load(config)?;
    Ok(config.check(&PipelineRuntime::new()))
}
