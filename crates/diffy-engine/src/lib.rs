//! Diffy analysis engine
//!
//! Compares the responses of a candidate service against two baselines and
//! reports the differences that are neither expected noise nor divergence
//! between the baselines themselves.
//!
//! # Pipeline
//!
//! ```text
//! responses ─► parse ─► transform (per role) ─► diff ─► merge ─► noise filter ─► DifferenceResult
//! ```
//!
//! - [`StructuralDiffer`]: classified depth-first JSON diff
//! - [`FieldTransformer`]: sandboxed per-field normalization
//! - [`NoiseFilter`]: pattern-based suppression per endpoint
//! - [`Analyzer`]: the orchestration above, single or batched
//! - [`RunSummary`]: aggregate statistics for a run
//!
//! # Example
//!
//! ```rust
//! use diffy_engine::{AnalysisRequest, Analyzer, ConfigSnapshot, PipelineRuntime};
//! use diffy_model::{NoiseRule, Responses};
//!
//! let snapshot = ConfigSnapshot::build(
//!     vec![NoiseRule::new("/users/1", vec!["ts".parse().unwrap()])],
//!     &[],
//!     &PipelineRuntime,
//! );
//! let request = AnalysisRequest::new(
//!     "run-1",
//!     "trace-1",
//!     "/users/1",
//!     0,
//!     Responses::new(
//!         r#"{"name":"a","ts":1}"#,
//!         r#"{"name":"a","ts":2}"#,
//!         r#"{"name":"b","ts":3}"#,
//!     ),
//! );
//! let result = Analyzer::default().analyze(request, &snapshot);
//! assert_eq!(result.differences().len(), 1);
//! assert_eq!(result.differences()[0].description, "a != b");
//! ```

#![warn(unreachable_pub)]

pub mod analyzer;
pub mod batch;
pub mod config;
pub mod differ;
pub mod error;
pub mod noise;
pub mod snapshot;
pub mod summary;
pub mod transform;

pub use analyzer::{AnalysisRequest, Analyzer};
pub use config::{BaselineNoisePolicy, EngineConfig, NumericTolerance};
pub use differ::StructuralDiffer;
pub use error::{EngineConfigError, TransformError};
pub use noise::NoiseFilter;
pub use snapshot::ConfigSnapshot;
pub use summary::{FieldSummary, RunSummary, SummaryOptions, DEFAULT_IGNORABLE_FIELDS};
pub use transform::{
    CompiledTransform, CompiledTransformation, FieldTransformer, PipelineRuntime,
    TransformOutcome, TransformRuntime,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
