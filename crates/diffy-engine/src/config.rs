//! Engine configuration
//!
//! Loaded from the `[engine]` table of the CLI configuration file; every
//! field has a default so an empty table is valid.

use crate::error::EngineConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How numbers are compared
///
/// In TOML: `numeric_tolerance = "exact"` or
/// `numeric_tolerance = { epsilon = 0.001 }`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericTolerance {
    /// Integers compare as integers; `1` equals `1.0`
    #[default]
    Exact,
    /// Numbers within an absolute distance are equal
    Epsilon(f64),
}

/// What to do with candidate differences the baselines also disagree on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineNoisePolicy {
    /// Report every primary/candidate difference that survives the noise rules
    #[default]
    ReportAll,
    /// Drop differences at paths where primary and secondary also differ
    SuppressBaselineDivergence,
}

/// Analysis tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Numeric comparison mode
    pub numeric_tolerance: NumericTolerance,
    /// Baseline divergence handling
    pub baseline_noise: BaselineNoisePolicy,
    /// Deepest level the differ descends to; deeper subtrees compare as a whole
    pub max_depth: usize,
    /// Invoke every transformation twice and reject disagreeing outputs
    pub verify_purity: bool,
    /// Wall-clock budget per transformation invocation
    pub max_transform_duration_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            numeric_tolerance: NumericTolerance::Exact,
            baseline_noise: BaselineNoisePolicy::ReportAll,
            max_depth: 128,
            verify_purity: true,
            max_transform_duration_ms: 50,
        }
    }
}

impl EngineConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set numeric tolerance
    #[inline]
    #[must_use]
    pub fn with_numeric_tolerance(mut self, tolerance: NumericTolerance) -> Self {
        self.numeric_tolerance = tolerance;
        self
    }

    /// Set baseline noise policy
    #[inline]
    #[must_use]
    pub fn with_baseline_noise(mut self, policy: BaselineNoisePolicy) -> Self {
        self.baseline_noise = policy;
        self
    }

    /// Set depth limit
    #[inline]
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Enable or disable the purity check
    #[inline]
    #[must_use]
    pub fn with_verify_purity(mut self, verify: bool) -> Self {
        self.verify_purity = verify;
        self
    }

    /// Set transformation budget
    #[inline]
    #[must_use]
    pub fn with_max_transform_duration(mut self, budget: Duration) -> Self {
        self.max_transform_duration_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Transformation budget as a [`Duration`]
    #[inline]
    #[must_use]
    pub fn transform_budget(&self) -> Duration {
        Duration::from_millis(self.max_transform_duration_ms)
    }

    /// Check the configuration for values the engine cannot honor
    ///
    /// # Errors
    /// Returns the first invalid setting found
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if let NumericTolerance::Epsilon(eps) = self.numeric_tolerance {
            if !eps.is_finite() || eps < 0.0 {
                return Err(EngineConfigError::InvalidEpsilon(eps));
            }
        }
        if self.max_depth == 0 {
            return Err(EngineConfigError::ZeroDepth);
        }
        if self.max_transform_duration_ms == 0 {
            return Err(EngineConfigError::ZeroBudget);
        }
        Ok(())
    }
}
