//! Operator-curated configuration: noise rules and transformations

use crate::path::{FieldPath, PathSegment};
use crate::pattern::{FieldPattern, PatternError};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Which service variant produced a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Production baseline
    Primary,
    /// Second baseline instance
    Secondary,
    /// Variant under test
    Candidate,
}

impl Role {
    /// All roles in analysis order
    pub const ALL: [Role; 3] = [Role::Primary, Role::Secondary, Role::Candidate];

    /// Lower-case name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Secondary => "secondary",
            Role::Candidate => "candidate",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = InjectionPointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Role::Primary),
            "secondary" => Ok(Role::Secondary),
            "candidate" => Ok(Role::Candidate),
            other => Err(InjectionPointError::UnknownRole(other.to_string())),
        }
    }
}

/// Set of roles a transformation applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoleFilter {
    /// One role only
    Only(Role),
    /// Every role
    #[default]
    All,
}

impl RoleFilter {
    /// Check if `role` is selected
    #[inline]
    #[must_use]
    pub fn includes(self, role: Role) -> bool {
        match self {
            RoleFilter::Only(only) => only == role,
            RoleFilter::All => true,
        }
    }
}

impl Display for RoleFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RoleFilter::Only(role) => role.fmt(f),
            RoleFilter::All => f.write_str("all"),
        }
    }
}

impl FromStr for RoleFilter {
    type Err = InjectionPointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            Ok(RoleFilter::All)
        } else {
            s.parse().map(RoleFilter::Only)
        }
    }
}

/// Where a transformation is applied: a pattern plus the roles it targets
///
/// Text form is `<role>:<pattern>`, e.g. `candidate:user.token` or
/// `all:items[*].ts`. A bare pattern means `all`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InjectionPoint {
    /// Roles whose responses are transformed
    pub roles: RoleFilter,
    /// Fields that are transformed
    pub pattern: FieldPattern,
}

impl InjectionPoint {
    /// Create injection point
    #[inline]
    #[must_use]
    pub fn new(roles: RoleFilter, pattern: FieldPattern) -> Self {
        Self { roles, pattern }
    }

    /// Check if a field of a `role` response at `path` is targeted
    #[inline]
    #[must_use]
    pub fn applies_to(&self, path: &FieldPath, role: Role) -> bool {
        self.applies_to_segments(path.segments(), role)
    }

    /// Like [`applies_to`](Self::applies_to), over a borrowed segment slice
    #[inline]
    #[must_use]
    pub fn applies_to_segments(&self, segments: &[PathSegment], role: Role) -> bool {
        self.roles.includes(role) && self.pattern.matches_segments(segments)
    }
}

impl Display for InjectionPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.roles, self.pattern)
    }
}

impl FromStr for InjectionPoint {
    type Err = InjectionPointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Only split on the first colon when the prefix names a role, so that
        // quoted keys containing ':' still parse as bare patterns.
        if let Some((prefix, rest)) = s.split_once(':') {
            if let Ok(roles) = prefix.parse::<RoleFilter>() {
                return Ok(Self::new(roles, rest.parse()?));
            }
        }
        Ok(Self::new(RoleFilter::All, s.parse()?))
    }
}

impl Serialize for InjectionPoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InjectionPoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors when parsing roles and injection points
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InjectionPointError {
    /// Role name is not `primary`, `secondary`, `candidate` or `all`
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// Pattern part is malformed
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Fields of one endpoint that are expected to vary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseRule {
    /// Endpoint the rule applies to
    pub endpoint: String,
    /// Noisy field patterns
    pub patterns: Vec<FieldPattern>,
}

impl NoiseRule {
    /// Create rule
    #[inline]
    #[must_use]
    pub fn new(endpoint: impl Into<String>, patterns: Vec<FieldPattern>) -> Self {
        Self {
            endpoint: endpoint.into(),
            patterns,
        }
    }

    /// Check if a difference at `path` on `endpoint` is noise under this rule
    #[must_use]
    pub fn suppresses(&self, endpoint: &str, path: &FieldPath) -> bool {
        self.endpoint == endpoint && self.patterns.iter().any(|p| p.covers(path))
    }
}

/// User-authored transformation logic attached to an injection point
///
/// `source` is interpreted by a sandboxed runtime at analysis time; the model
/// never executes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transformation {
    /// Where the transformation applies
    pub injection_point: InjectionPoint,
    /// Transformation source text
    pub source: String,
}

impl Transformation {
    /// Create transformation
    #[inline]
    #[must_use]
    pub fn new(injection_point: InjectionPoint, source: impl Into<String>) -> Self {
        Self {
            injection_point,
            source: source.into(),
        }
    }
}
