//! Reported divergences between two responses

use crate::path::FieldPath;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Classification of a [`FieldDifference`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DifferenceKind {
    /// Two scalars of the same type with different values
    PrimitiveDifference,
    /// Values of different JSON types (including null vs value)
    TypeDifference,
    /// Key present in the reference response only
    MissingField,
    /// Key present in the compared response only
    ExtraField,
    /// Arrays of different length
    SeqSizeDifference,
    /// A response payload could not be parsed (synthetic)
    ParseFailure,
    /// The analysis itself failed (synthetic)
    AnalysisAborted,
}

impl DifferenceKind {
    /// Stable name used in reports
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PrimitiveDifference => "PrimitiveDifference",
            Self::TypeDifference => "TypeDifference",
            Self::MissingField => "MissingField",
            Self::ExtraField => "ExtraField",
            Self::SeqSizeDifference => "SeqSizeDifference",
            Self::ParseFailure => "ParseFailure",
            Self::AnalysisAborted => "AnalysisAborted",
        }
    }

    /// Synthetic kinds describe a failure, not a field comparison
    #[inline]
    #[must_use]
    pub const fn is_synthetic(self) -> bool {
        matches!(self, Self::ParseFailure | Self::AnalysisAborted)
    }
}

impl Display for DifferenceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point of divergence: where, what kind, and a human-readable description
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDifference {
    /// Full path from the response root
    pub path: FieldPath,
    /// Classification
    pub kind: DifferenceKind,
    /// Human-readable description, e.g. `a != b`
    pub description: String,
}

impl FieldDifference {
    /// Create difference
    #[inline]
    #[must_use]
    pub fn new(path: FieldPath, kind: DifferenceKind, description: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            description: description.into(),
        }
    }

    /// Synthetic root-level difference describing a parse failure
    #[inline]
    #[must_use]
    pub fn parse_failure(description: impl Into<String>) -> Self {
        Self::new(FieldPath::root(), DifferenceKind::ParseFailure, description)
    }

    /// Synthetic root-level difference describing an aborted analysis
    #[inline]
    #[must_use]
    pub fn analysis_aborted(message: impl Display) -> Self {
        Self::new(
            FieldPath::root(),
            DifferenceKind::AnalysisAborted,
            format!("analysis aborted: {message}"),
        )
    }

    /// Check if this difference is synthetic
    #[inline]
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.kind.is_synthetic()
    }
}

impl Display for FieldDifference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_root() {
            "<root>".to_string()
        } else {
            self.path.to_string()
        };
        write!(f, "{path}: {} ({})", self.description, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difference_serde_shape() {
        let diff = FieldDifference::new(
            "name".parse().unwrap(),
            DifferenceKind::PrimitiveDifference,
            "a != b",
        );
        let json = serde_json::to_value(&diff).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "path": "name",
                "kind": "PrimitiveDifference",
                "description": "a != b"
            })
        );
    }

    #[test]
    fn synthetic_kinds() {
        assert!(FieldDifference::parse_failure("bad json").is_synthetic());
        assert!(FieldDifference::analysis_aborted("boom").is_synthetic());
        assert!(!DifferenceKind::MissingField.is_synthetic());
    }

    #[test]
    fn analysis_aborted_description() {
        let diff = FieldDifference::analysis_aborted("index out of bounds");
        assert_eq!(diff.description, "analysis aborted: index out of bounds");
        assert!(diff.path.is_root());
    }

    #[test]
    fn difference_display() {
        let diff = FieldDifference::parse_failure("candidate: expected value");
        assert_eq!(
            diff.to_string(),
            "<root>: candidate: expected value (ParseFailure)"
        );
    }
}
