//! Error types for the analysis engine
//!
//! Analysis itself never fails: problems are folded into the
//! [`DifferenceResult`](diffy_model::DifferenceResult) as synthetic
//! differences or diagnostics. The errors here surface from transformation
//! runtimes and from configuration validation.

/// Errors raised while compiling or running a transformation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// Source text was rejected by the runtime
    #[error("compile error: {0}")]
    Compile(String),

    /// Transformation failed on a value
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Output is not a valid replacement for the input
    #[error("invalid output: expected {expected}, got {actual}")]
    InvalidOutput {
        /// Kind of value that was acceptable
        expected: String,
        /// Kind of value produced
        actual: String,
    },

    /// Two invocations on the same input disagreed
    #[error("transformation is not deterministic; its output is ignored")]
    UnsupportedImpure,

    /// Transformation panicked
    #[error("transformation panicked: {0}")]
    Panicked(String),

    /// Transformation ran longer than allowed
    #[error("transformation took {elapsed_ms}ms (budget: {budget_ms}ms)")]
    BudgetExceeded {
        /// Observed duration
        elapsed_ms: u64,
        /// Allowed duration
        budget_ms: u64,
    },
}

impl TransformError {
    /// Create runtime error
    #[inline]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// Create compile error
    #[inline]
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile(message.into())
    }

    /// Create invalid output error
    #[inline]
    pub fn invalid_output(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidOutput {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Errors when validating an [`EngineConfig`](crate::EngineConfig)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineConfigError {
    /// Epsilon must be finite and non-negative
    #[error("invalid numeric epsilon: {0}")]
    InvalidEpsilon(f64),

    /// Depth limit must allow at least the root
    #[error("max_depth must be at least 1")]
    ZeroDepth,

    /// Transformation budget must be positive
    #[error("max_transform_duration_ms must be at least 1")]
    ZeroBudget,
}
