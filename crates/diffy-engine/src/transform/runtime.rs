//! Sandbox boundary for user-authored transformation logic
//!
//! A [`TransformRuntime`] turns source text into a [`CompiledTransform`]. The
//! engine never calls a compiled transform directly: every invocation goes
//! through [`invoke_guarded`], which contains panics, enforces the time budget
//! and rejects outputs that cannot stand in for the input.
//!
//! The time budget is measured after the transform returns; it discards slow
//! results but cannot interrupt a transform that never returns. Runtimes must
//! bound their own work: the pipeline runtime has no loops and size-limits its
//! regexes. A budget overrun depends on machine load, so it is recorded as a
//! diagnostic on the result rather than passing silently.

use crate::error::TransformError;
use serde_json::Value;
use std::any::Any;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Executable transformation produced by a runtime
pub trait CompiledTransform: Send + Sync + Debug {
    /// Map one field value to its normalized form
    ///
    /// # Errors
    /// Returns [`TransformError`] when the value cannot be transformed
    fn apply(&self, value: &Value) -> Result<Value, TransformError>;

    /// Human-readable description
    fn describe(&self) -> String;
}

/// Compiler for transformation source text
pub trait TransformRuntime: Send + Sync + Debug {
    /// Runtime name, for diagnostics
    fn name(&self) -> &str;

    /// Compile source text
    ///
    /// # Errors
    /// Returns [`TransformError::Compile`] for rejected source
    fn compile(&self, source: &str) -> Result<Box<dyn CompiledTransform>, TransformError>;
}

/// Invoke a compiled transform under the sandbox guard
///
/// # Errors
/// - [`TransformError::Panicked`] if the transform panicked
/// - [`TransformError::BudgetExceeded`] if it ran longer than `budget`,
///   checked once the call has returned
/// - [`TransformError::InvalidOutput`] if the output is incompatible
/// - any error the transform itself returned
pub fn invoke_guarded(
    transform: &dyn CompiledTransform,
    input: &Value,
    budget: Duration,
) -> Result<Value, TransformError> {
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| transform.apply(input)));
    let elapsed = started.elapsed();

    let output = match outcome {
        Ok(result) => result?,
        Err(payload) => return Err(TransformError::Panicked(panic_message(payload.as_ref()))),
    };
    if elapsed > budget {
        return Err(TransformError::BudgetExceeded {
            elapsed_ms: millis(elapsed),
            budget_ms: millis(budget),
        });
    }
    check_compatible(input, &output)?;
    Ok(output)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Extract a message from a panic payload
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Shape class of a value for output validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Null,
    Scalar,
    Array,
    Object,
}

impl Shape {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) | Value::Number(_) | Value::String(_) => Self::Scalar,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Scalar => "scalar",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// Reject scalar-to-container outputs and array/object swaps
///
/// Containers may collapse to scalars (a hash, a constant) and anything may
/// become null.
fn check_compatible(input: &Value, output: &Value) -> Result<(), TransformError> {
    let (from, to) = (Shape::of(input), Shape::of(output));
    let ok = match (from, to) {
        (_, Shape::Null | Shape::Scalar) => true,
        (Shape::Null | Shape::Scalar, _) => false,
        (from, to) => from == to,
    };
    if ok {
        Ok(())
    } else {
        let expected = match from {
            Shape::Null | Shape::Scalar => "scalar or null".to_string(),
            other => format!("{}, scalar or null", other.name()),
        };
        Err(TransformError::invalid_output(expected, to.name()))
    }
}
