//! Structural comparison of two JSON trees
//!
//! The differ walks two responses depth-first and reports every point where
//! they diverge, classified by [`DifferenceKind`]. Traversal order is fully
//! determined by the inputs: object keys are visited in map order for the
//! reference side, then keys present only on the compared side; arrays are
//! compared positionally. `serde_json` maps keep keys sorted, so the order of
//! keys in the raw response never affects the output.

use crate::config::{EngineConfig, NumericTolerance};
use diffy_model::{DifferenceKind, FieldDifference, FieldPath, PathSegment};
use serde_json::{Number, Value};

/// Longest rendering of a container value inside a description
const MAX_RENDERED_LEN: usize = 120;

/// Pure, deterministic JSON tree differ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructuralDiffer {
    tolerance: NumericTolerance,
    max_depth: usize,
}

impl Default for StructuralDiffer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl StructuralDiffer {
    /// Create differ
    #[inline]
    #[must_use]
    pub fn new(tolerance: NumericTolerance, max_depth: usize) -> Self {
        Self {
            tolerance,
            max_depth: max_depth.max(1),
        }
    }

    /// Create differ from engine configuration
    #[inline]
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.numeric_tolerance, config.max_depth)
    }

    /// Numeric comparison mode
    #[inline]
    #[must_use]
    pub fn tolerance(&self) -> NumericTolerance {
        self.tolerance
    }

    /// Compare `a` (reference side) with `b` (compared side)
    ///
    /// Returns differences in depth-first traversal order; identical trees
    /// yield an empty vector.
    #[must_use]
    pub fn diff(&self, a: &Value, b: &Value) -> Vec<FieldDifference> {
        let mut walk = Walk {
            differ: self,
            path: Vec::new(),
            out: Vec::new(),
        };
        walk.compare(a, b);
        walk.out
    }

    /// Deep equality under the configured numeric tolerance
    #[must_use]
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        // Explicit stack: used at the depth cut-off where recursion is unsafe
        let mut pending = vec![(a, b)];
        while let Some((a, b)) = pending.pop() {
            match (a, b) {
                (Value::Object(x), Value::Object(y)) => {
                    if x.len() != y.len() {
                        return false;
                    }
                    for (key, av) in x {
                        match y.get(key) {
                            Some(bv) => pending.push((av, bv)),
                            None => return false,
                        }
                    }
                }
                (Value::Array(x), Value::Array(y)) => {
                    if x.len() != y.len() {
                        return false;
                    }
                    pending.extend(x.iter().zip(y));
                }
                _ => {
                    if !self.scalars_equal(a, b) {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn scalars_equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => numbers_equal(x, y, self.tolerance),
            _ => a == b,
        }
    }
}

#[allow(clippy::float_cmp, clippy::cast_precision_loss)]
fn numbers_equal(a: &Number, b: &Number, tolerance: NumericTolerance) -> bool {
    if let (Some(x), Some(y)) = (integer(a), integer(b)) {
        return match tolerance {
            NumericTolerance::Exact => x == y,
            NumericTolerance::Epsilon(eps) => x == y || (x - y).unsigned_abs() as f64 <= eps,
        };
    }
    match (a.as_f64(), b.as_f64(), tolerance) {
        (Some(x), Some(y), NumericTolerance::Exact) => x == y,
        (Some(x), Some(y), NumericTolerance::Epsilon(eps)) => (x - y).abs() <= eps,
        _ => a == b,
    }
}

fn integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// JSON type name used in type-mismatch descriptions
#[must_use]
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a value for a description: strings unquoted, everything else as
/// compact JSON, long containers shortened
#[must_use]
pub fn render(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() <= MAX_RENDERED_LEN {
        return text;
    }
    let mut short: String = text.chars().take(MAX_RENDERED_LEN).collect();
    short.push_str("...");
    short
}

struct Walk<'a> {
    differ: &'a StructuralDiffer,
    path: Vec<PathSegment>,
    out: Vec<FieldDifference>,
}

impl Walk<'_> {
    fn push(&mut self, kind: DifferenceKind, description: String) {
        self.out.push(FieldDifference::new(
            FieldPath::from(self.path.as_slice()),
            kind,
            description,
        ));
    }

    fn compare(&mut self, a: &Value, b: &Value) {
        if self.path.len() >= self.differ.max_depth {
            self.compare_whole(a, b);
            return;
        }
        match (a, b) {
            (Value::Object(x), Value::Object(y)) => {
                for (key, av) in x {
                    self.path.push(PathSegment::Key(key.clone()));
                    match y.get(key) {
                        Some(bv) => self.compare(av, bv),
                        None => self.push(
                            DifferenceKind::MissingField,
                            format!("{} != <absent>", render(av)),
                        ),
                    }
                    self.path.pop();
                }
                for (key, bv) in y {
                    if !x.contains_key(key) {
                        self.path.push(PathSegment::Key(key.clone()));
                        self.push(
                            DifferenceKind::ExtraField,
                            format!("<absent> != {}", render(bv)),
                        );
                        self.path.pop();
                    }
                }
            }
            (Value::Array(x), Value::Array(y)) => {
                if x.len() != y.len() {
                    self.push(
                        DifferenceKind::SeqSizeDifference,
                        format!("length {} != {}", x.len(), y.len()),
                    );
                }
                for (index, (av, bv)) in x.iter().zip(y).enumerate() {
                    self.path.push(PathSegment::Index(index));
                    self.compare(av, bv);
                    self.path.pop();
                }
            }
            _ => self.compare_scalars(a, b),
        }
    }

    fn compare_scalars(&mut self, a: &Value, b: &Value) {
        if type_name(a) != type_name(b) {
            self.push(
                DifferenceKind::TypeDifference,
                format!(
                    "{} != {} ({} vs {})",
                    render(a),
                    render(b),
                    type_name(a),
                    type_name(b)
                ),
            );
        } else if !self.differ.scalars_equal(a, b) {
            self.push(
                DifferenceKind::PrimitiveDifference,
                format!("{} != {}", render(a), render(b)),
            );
        }
    }

    fn compare_whole(&mut self, a: &Value, b: &Value) {
        if self.differ.values_equal(a, b) {
            return;
        }
        let is_container = |v: &Value| matches!(v, Value::Array(_) | Value::Object(_));
        if !is_container(a) && !is_container(b) {
            self.compare_scalars(a, b);
            return;
        }
        let kind = if type_name(a) == type_name(b) {
            DifferenceKind::PrimitiveDifference
        } else {
            DifferenceKind::TypeDifference
        };
        self.push(
            kind,
            format!(
                "subtree differs below depth {}: {} != {}",
                self.differ.max_depth,
                render(a),
                render(b)
            ),
        );
    }
}
