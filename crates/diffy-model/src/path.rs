//! Field paths for addressing within response trees
//!
//! Provides [`FieldPath`] for locating a value inside a parsed response, and the
//! shared text scanner used by both paths and [`crate::FieldPattern`].
//!
//! # Text form
//! - keys are joined with `.`: `user.name`
//! - array indices use brackets: `user.addresses[0].zip`
//! - keys that cannot be written bare are quoted: `headers["x.request-id"]`
//! - the root path is the empty string

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// One step in a [`FieldPath`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathSegment {
    /// Object member
    Key(String),
    /// Array element
    Index(usize),
}

impl PathSegment {
    /// Object member segment
    #[inline]
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }

    /// Key name, if this is an object member
    #[inline]
    #[must_use]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(k) => Some(k),
            Self::Index(_) => None,
        }
    }
}

/// Location of a value within a response tree
///
/// Used as the addressing scheme for reported differences, noise rules and
/// transformation injection points.
///
/// # Examples
/// - `["user", "name"]` → `user.name`
/// - `["items", 2, "ts"]` → `items[2].ts`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    /// Create path from segments
    #[inline]
    #[must_use]
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// Empty path (root of the response)
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Get path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if this is the root path
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Same as [`FieldPath::is_root`]
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parent path (if not root)
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .split_last()
            .map(|(_, init)| Self(init.to_vec()))
    }

    /// Last segment (if not root)
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// Name of the innermost object key, skipping trailing indices
    ///
    /// `items[3]` and `items` both yield `items`.
    #[must_use]
    pub fn leaf_key(&self) -> Option<&str> {
        self.0.iter().rev().find_map(PathSegment::as_key)
    }

    /// Append an object key, returning new path
    #[inline]
    #[must_use]
    pub fn child_key(&self, key: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(PathSegment::Key(key.into()));
        new
    }

    /// Append an array index, returning new path
    #[inline]
    #[must_use]
    pub fn child_index(&self, index: usize) -> Self {
        let mut new = self.clone();
        new.0.push(PathSegment::Index(index));
        new
    }

    /// Check if this path is a prefix of another (or equal to it)
    #[inline]
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Check if this path is a strict ancestor of another
    #[inline]
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.0.len() < other.0.len() && self.is_prefix_of(other)
    }

    /// Iterator over segments from root to leaf
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &PathSegment> {
        self.0.iter()
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) => write_key(f, key, i == 0)?,
                PathSegment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments = scan(s)?
            .into_iter()
            .map(|raw| match raw {
                RawSegment::Key { name, .. } if !is_wildcard_key(&name) => {
                    Ok(PathSegment::Key(name))
                }
                RawSegment::Key { name, quoted: true } => Ok(PathSegment::Key(name)),
                RawSegment::Key { name, quoted: false } => Err(PathError::WildcardInPath(name)),
                RawSegment::Index(idx) => Ok(PathSegment::Index(idx)),
                RawSegment::AnyIndex => Err(PathError::WildcardInPath("[*]".to_string())),
            })
            .collect::<Result<_, _>>()?;
        Ok(Self(segments))
    }
}

impl From<Vec<PathSegment>> for FieldPath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl From<&[PathSegment]> for FieldPath {
    fn from(segments: &[PathSegment]) -> Self {
        Self(segments.to_vec())
    }
}

impl serde::Serialize for FieldPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for FieldPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors related to field paths and patterns
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// `a..b`, a leading or a trailing dot
    #[error("path contains empty segment")]
    EmptySegment,

    /// Characters that must be quoted appear in a bare key
    #[error("invalid segment: {0} (quote it as [\"...\"])")]
    InvalidSegment(String),

    /// `[` without matching `]`
    #[error("unterminated bracket at offset {0}")]
    UnterminatedBracket(usize),

    /// Bracket content is neither an index, `*`, nor a quoted key
    #[error("invalid index: {0}")]
    InvalidIndex(String),

    /// Wildcards are only valid in patterns
    #[error("wildcard '{0}' is not allowed in a concrete path")]
    WildcardInPath(String),
}

/// Segment as written, before path/pattern interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RawSegment {
    Key { name: String, quoted: bool },
    Index(usize),
    AnyIndex,
}

pub(crate) fn is_wildcard_key(name: &str) -> bool {
    name == "*" || name == "**"
}

fn needs_quoting(key: &str) -> bool {
    key.is_empty()
        || is_wildcard_key(key)
        || key
            .chars()
            .any(|c| matches!(c, '.' | '[' | ']' | '"') || c.is_whitespace())
}

/// Write a key segment, quoting it when the bare form would not round-trip
pub(crate) fn write_key(f: &mut Formatter<'_>, key: &str, first: bool) -> fmt::Result {
    if needs_quoting(key) {
        // serde_json never fails on a plain string
        let quoted = serde_json::to_string(key).map_err(|_| fmt::Error)?;
        write!(f, "[{quoted}]")
    } else if first {
        f.write_str(key)
    } else {
        write!(f, ".{key}")
    }
}

/// Split path text into raw segments
pub(crate) fn scan(s: &str) -> Result<Vec<RawSegment>, PathError> {
    let bytes = s.as_bytes();
    let mut segments = Vec::new();
    let mut pos = 0;
    // a dot was consumed and a key must follow
    let mut pending_dot = false;

    while pos < bytes.len() {
        match bytes[pos] {
            b'.' => {
                if pending_dot || segments.is_empty() {
                    return Err(PathError::EmptySegment);
                }
                pending_dot = true;
                pos += 1;
            }
            b'[' => {
                let (segment, next) = scan_bracket(s, pos)?;
                segments.push(segment);
                pending_dot = false;
                pos = next;
            }
            _ => {
                if !segments.is_empty() && !pending_dot {
                    // `a[0]b` - a bare key must follow a dot
                    return Err(PathError::InvalidSegment(s[pos..].to_string()));
                }
                let end = s[pos..]
                    .find(['.', '['])
                    .map_or(s.len(), |offset| pos + offset);
                let name = &s[pos..end];
                if name.contains([']', '"']) || name.chars().any(char::is_whitespace) {
                    return Err(PathError::InvalidSegment(name.to_string()));
                }
                segments.push(RawSegment::Key {
                    name: name.to_string(),
                    quoted: false,
                });
                pending_dot = false;
                pos = end;
            }
        }
    }

    if pending_dot {
        return Err(PathError::EmptySegment);
    }
    Ok(segments)
}

fn scan_bracket(s: &str, start: usize) -> Result<(RawSegment, usize), PathError> {
    let inner_start = start + 1;
    let rest = &s[inner_start..];

    if rest.starts_with('"') {
        // Quoted key: read a JSON string literal, then expect `]`
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<String>();
        let name = match stream.next() {
            Some(Ok(name)) => name,
            _ => return Err(PathError::UnterminatedBracket(start)),
        };
        let close = inner_start + stream.byte_offset();
        if s.as_bytes().get(close) != Some(&b']') {
            return Err(PathError::UnterminatedBracket(start));
        }
        return Ok((RawSegment::Key { name, quoted: true }, close + 1));
    }

    let close = rest
        .find(']')
        .map(|offset| inner_start + offset)
        .ok_or(PathError::UnterminatedBracket(start))?;
    let inner = &s[inner_start..close];
    let segment = if inner == "*" {
        RawSegment::AnyIndex
    } else {
        inner
            .parse::<usize>()
            .map(RawSegment::Index)
            .map_err(|_| PathError::InvalidIndex(inner.to_string()))?
    };
    Ok((segment, close + 1))
}
