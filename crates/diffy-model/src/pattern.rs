//! Field path patterns
//!
//! [`FieldPattern`] is the matching language shared by noise rules and
//! transformation injection points.
//!
//! # Grammar
//! A pattern is written like a [`FieldPath`], with three wildcards:
//! - `[*]` matches any single array index
//! - `*` matches any single object key
//! - `**` matches zero or more segments of any kind
//!
//! Quoting a wildcard (`["*"]`) makes it a literal key.
//!
//! # Examples
//! - `items[*].ts` matches `items[0].ts` and `items[7].ts`
//! - `*.id` matches `user.id` and `order.id`, not `id`
//! - `**.ts` matches `ts`, `a.ts` and `a[2].b.ts`

use crate::path::{scan, write_key, FieldPath, PathError, PathSegment, RawSegment};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// One step of a [`FieldPattern`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternSegment {
    /// Literal object key
    Key(String),
    /// Literal array index
    Index(usize),
    /// `*`
    AnyKey,
    /// `[*]`
    AnyIndex,
    /// `**`
    AnyDepth,
}

impl PatternSegment {
    fn matches(&self, segment: &PathSegment) -> bool {
        match (self, segment) {
            (Self::Key(want), PathSegment::Key(got)) => want == got,
            (Self::Index(want), PathSegment::Index(got)) => want == got,
            (Self::AnyKey, PathSegment::Key(_)) | (Self::AnyIndex, PathSegment::Index(_)) => true,
            // AnyDepth is handled by the matcher
            _ => false,
        }
    }
}

/// Pattern over [`FieldPath`]s
///
/// Patterns are never empty: a rule that matched the root would match every
/// field of every response, so the empty string is rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPattern(Vec<PatternSegment>);

impl FieldPattern {
    /// Create pattern from segments
    ///
    /// # Errors
    /// Returns [`PatternError::Empty`] if `segments` is empty
    pub fn new(segments: Vec<PatternSegment>) -> Result<Self, PatternError> {
        if segments.is_empty() {
            return Err(PatternError::Empty);
        }
        Ok(Self(segments))
    }

    /// Pattern matching exactly one concrete path
    ///
    /// # Errors
    /// Returns [`PatternError::Empty`] for the root path
    pub fn exact(path: &FieldPath) -> Result<Self, PatternError> {
        Self::new(
            path.iter()
                .map(|segment| match segment {
                    PathSegment::Key(k) => PatternSegment::Key(k.clone()),
                    PathSegment::Index(i) => PatternSegment::Index(*i),
                })
                .collect(),
        )
    }

    /// Pattern segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[PatternSegment] {
        &self.0
    }

    /// Check if the pattern contains no wildcard
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.0
            .iter()
            .all(|s| matches!(s, PatternSegment::Key(_) | PatternSegment::Index(_)))
    }

    /// Check if the pattern matches `path` exactly
    #[must_use]
    pub fn matches(&self, path: &FieldPath) -> bool {
        match_segments(&self.0, path.segments(), false)
    }

    /// Like [`matches`](Self::matches), over a borrowed segment slice
    ///
    /// Lets tree walkers test a pattern without materializing a path per node.
    #[inline]
    #[must_use]
    pub fn matches_segments(&self, segments: &[PathSegment]) -> bool {
        match_segments(&self.0, segments, false)
    }

    /// Check if the pattern matches `path` or any of its ancestors
    ///
    /// Used for noise suppression: a rule on `user` covers `user.name`.
    #[must_use]
    pub fn covers(&self, path: &FieldPath) -> bool {
        match_segments(&self.0, path.segments(), true)
    }
}

/// Positions in `path` reachable after consuming each pattern segment
///
/// Linear in `pattern.len() * path.len()` however many `**` the pattern holds.
fn match_segments(pattern: &[PatternSegment], path: &[PathSegment], allow_prefix: bool) -> bool {
    let mut reachable = vec![false; path.len() + 1];
    let mut next = vec![false; path.len() + 1];
    reachable[0] = true;
    for head in pattern {
        next.fill(false);
        if *head == PatternSegment::AnyDepth {
            let mut seen = false;
            for (slot, &here) in next.iter_mut().zip(&reachable) {
                seen |= here;
                *slot = seen;
            }
        } else {
            for (i, segment) in path.iter().enumerate() {
                if reachable[i] && head.matches(segment) {
                    next[i + 1] = true;
                }
            }
        }
        std::mem::swap(&mut reachable, &mut next);
        if !reachable.contains(&true) {
            return false;
        }
    }
    if allow_prefix {
        reachable.contains(&true)
    } else {
        reachable[path.len()]
    }
}

impl Display for FieldPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            let sep = if i == 0 { "" } else { "." };
            match segment {
                PatternSegment::Key(key) => write_key(f, key, i == 0)?,
                PatternSegment::Index(idx) => write!(f, "[{idx}]")?,
                PatternSegment::AnyIndex => f.write_str("[*]")?,
                PatternSegment::AnyKey => write!(f, "{sep}*")?,
                PatternSegment::AnyDepth => write!(f, "{sep}**")?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments = scan(s)?
            .into_iter()
            .map(|raw| match raw {
                RawSegment::Key { name, quoted: false } if name == "*" => PatternSegment::AnyKey,
                RawSegment::Key { name, quoted: false } if name == "**" => {
                    PatternSegment::AnyDepth
                }
                RawSegment::Key { name, .. } => PatternSegment::Key(name),
                RawSegment::Index(idx) => PatternSegment::Index(idx),
                RawSegment::AnyIndex => PatternSegment::AnyIndex,
            })
            .collect();
        Self::new(segments)
    }
}

impl serde::Serialize for FieldPattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for FieldPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors when parsing a [`FieldPattern`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// Pattern has no segments
    #[error("pattern must not be empty")]
    Empty,

    /// Malformed path syntax
    #[error("invalid pattern: {0}")]
    Syntax(#[from] PathError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(s: &str) -> FieldPattern {
        s.parse().unwrap()
    }

    fn path(s: &str) -> FieldPath {
        s.parse().unwrap()
    }

    #[test]
    fn pattern_exact_match() {
        let p = pattern("user.name");
        assert!(p.is_literal());
        assert!(p.matches(&path("user.name")));
        assert!(!p.matches(&path("user.email")));
        assert!(!p.matches(&path("user")));
    }

    #[test]
    fn pattern_any_index() {
        let p = pattern("items[*].ts");
        assert!(p.matches(&path("items[0].ts")));
        assert!(p.matches(&path("items[2].ts")));
        assert!(!p.matches(&path("items.ts")));
        assert!(!p.matches(&path("items[2].v")));
    }

    #[test]
    fn pattern_literal_index_is_positional() {
        let p = pattern("items[0].ts");
        assert!(p.matches(&path("items[0].ts")));
        assert!(!p.matches(&path("items[2].ts")));
    }

    #[test]
    fn pattern_any_key() {
        let p = pattern("*.id");
        assert!(p.matches(&path("user.id")));
        assert!(p.matches(&path("order.id")));
        assert!(!p.matches(&path("id")));
        assert!(!p.matches(&path("[0].id")));
    }

    #[test]
    fn pattern_any_depth() {
        let p = pattern("**.ts");
        assert!(p.matches(&path("ts")));
        assert!(p.matches(&path("a.ts")));
        assert!(p.matches(&path("a[2].b.ts")));
        assert!(!p.matches(&path("a.tsx")));

        let middle = pattern("data.**.id");
        assert!(middle.matches(&path("data.id")));
        assert!(middle.matches(&path("data.x[1].y.id")));
        assert!(!middle.matches(&path("meta.id")));
    }

    #[test]
    fn pattern_repeated_any_depth_stays_linear() {
        let deep = FieldPath::new((0..400).map(|i| PathSegment::key(format!("k{i}"))).collect());
        let p = pattern("**.**.**.**.**.**.**.**.x");
        assert!(!p.matches(&deep));
        assert!(!p.covers(&deep));
        assert!(pattern("**.k1.**.**.k399").matches(&deep));
        assert!(pattern("**.**.k7").covers(&deep));
    }

    #[test]
    fn pattern_covers_descendants() {
        let p = pattern("user");
        assert!(p.covers(&path("user")));
        assert!(p.covers(&path("user.name")));
        assert!(p.covers(&path("user.addresses[0].zip")));
        assert!(!p.covers(&path("users")));
        assert!(!p.matches(&path("user.name")));
    }

    #[test]
    fn pattern_rejects_empty() {
        assert_eq!("".parse::<FieldPattern>(), Err(PatternError::Empty));
        assert_eq!(FieldPattern::new(vec![]), Err(PatternError::Empty));
        assert!(FieldPattern::exact(&FieldPath::root()).is_err());
    }

    #[test]
    fn pattern_quoted_star_is_literal() {
        let p = pattern(r#"["*"].x"#);
        assert!(p.is_literal());
        assert!(p.matches(&FieldPath::root().child_key("*").child_key("x")));
        assert!(!p.matches(&path("a.x")));
    }

    #[test]
    fn pattern_display_round_trip() {
        for text in ["items[*].ts", "*.id", "**.ts", "a.**", "data.**.id", "[*]", "a[3].b"] {
            assert_eq!(pattern(text).to_string(), text);
        }
    }

    #[test]
    fn pattern_exact_from_path() {
        let p = FieldPattern::exact(&path("a[1].b")).unwrap();
        assert_eq!(p.to_string(), "a[1].b");
        assert!(p.matches(&path("a[1].b")));
    }

    #[test]
    fn pattern_serde_as_string() {
        let p = pattern("items[*].ts");
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#""items[*].ts""#);
        let bad: Result<FieldPattern, _> = serde_json::from_str(r#""a..b""#);
        assert!(bad.is_err());
    }
}
