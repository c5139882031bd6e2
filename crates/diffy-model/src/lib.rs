//! Diffy data model
//!
//! Types shared by the difference-analysis engine and the stores that persist
//! its output.
//!
//! # Core Concepts
//!
//! - [`FieldPath`]: location of a value inside a response tree
//! - [`FieldPattern`]: wildcard pattern over paths, used by noise rules and
//!   transformation injection points
//! - [`FieldDifference`]: one classified point of divergence
//! - [`DifferenceResult`]: the immutable record of one analyzed request
//! - [`NoiseRule`] / [`Transformation`]: operator-curated configuration
//! - [`SnapshotId`]: content hash naming a configuration snapshot
//!
//! # Example
//!
//! ```rust
//! use diffy_model::{FieldPath, FieldPattern};
//!
//! let pattern: FieldPattern = "items[*].ts".parse().unwrap();
//! let path: FieldPath = "items[2].ts".parse().unwrap();
//! assert!(pattern.matches(&path));
//! ```

#![warn(unreachable_pub)]

mod difference;
mod path;
mod pattern;
mod result;
mod rule;
mod snapshot;

pub use difference::{DifferenceKind, FieldDifference};
pub use path::{FieldPath, PathError, PathSegment};
pub use pattern::{FieldPattern, PatternError, PatternSegment};
pub use result::{
    ConfigProvenance, ConfigStatus, Diagnostic, DiagnosticKind, DifferenceResult,
    DifferenceResultBuilder, Responses,
};
pub use rule::{InjectionPoint, InjectionPointError, NoiseRule, Role, RoleFilter, Transformation};
pub use snapshot::{SnapshotId, SnapshotIdError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
