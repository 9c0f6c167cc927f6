//! Materialized-path value objects for the department tree.
//!
//! A department's path is the dot-joined, lower-cased sequence of the
//! identifiers of all its ancestors, ending with its own identifier.
//! Segment *i* (1-based) is the identifier of the ancestor at depth *i*,
//! so the path is a total ancestry record and depth equals segment count.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum allowed length for a department identifier.
pub const MAX_IDENTIFIER_LENGTH: usize = 150;

/// Path segment separator.
pub const PATH_SEPARATOR: char = '.';

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{1,150}$").expect("valid regex"));

// ---------------------------------------------------------------------------
// DepartmentIdentifier
// ---------------------------------------------------------------------------

/// A single path segment: a latin-only token, stored lower-cased.
///
/// Identifiers are matched case-insensitively everywhere; lower-casing at
/// construction makes plain string comparison sufficient downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DepartmentIdentifier(String);

impl DepartmentIdentifier {
    /// Validate and normalize a raw identifier.
    ///
    /// Accepts only latin letters, 1 to [`MAX_IDENTIFIER_LENGTH`] characters.
    pub fn new(raw: &str) -> Result<Self, CoreError> {
        if !IDENTIFIER_RE.is_match(raw) {
            return Err(CoreError::Validation(format!(
                "Department identifier must be 1-{MAX_IDENTIFIER_LENGTH} latin letters, got '{raw}'"
            )));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DepartmentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DepartmentIdentifier {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<DepartmentIdentifier> for String {
    fn from(id: DepartmentIdentifier) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// DepartmentPath
// ---------------------------------------------------------------------------

/// A dot-joined, lower-cased sequence of department identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DepartmentPath(String);

impl DepartmentPath {
    /// The path of a root department: its own identifier.
    pub fn root(identifier: &DepartmentIdentifier) -> Self {
        Self(identifier.as_str().to_string())
    }

    /// Parse a stored path, validating every segment.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if raw.is_empty() {
            return Err(CoreError::Validation(
                "Department path must not be empty".to_string(),
            ));
        }
        for segment in raw.split(PATH_SEPARATOR) {
            DepartmentIdentifier::new(segment)?;
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the path's segments in root-to-leaf order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(PATH_SEPARATOR)
    }

    /// Number of segments; equals the depth of the node owning this path.
    pub fn depth(&self) -> i32 {
        self.segments().count() as i32
    }

    /// Segment-wise match of an identifier anywhere in the path.
    pub fn contains_identifier(&self, identifier: &DepartmentIdentifier) -> bool {
        self.segments().any(|s| s == identifier.as_str())
    }

    /// 1-based index of the first occurrence of `identifier` in the path.
    pub fn depth_level(&self, identifier: &DepartmentIdentifier) -> Result<i32, CoreError> {
        self.segments()
            .position(|s| s == identifier.as_str())
            .map(|i| i as i32 + 1)
            .ok_or_else(|| CoreError::NotFound {
                entity: "path segment",
                key: format!("{identifier} in {self}"),
            })
    }

    /// Append a child identifier, producing the child's path.
    ///
    /// Fails with `Conflict` if the identifier already occurs as a segment:
    /// a path that contained the same identifier twice would describe a
    /// node inside its own subtree.
    pub fn concat(&self, child: &DepartmentIdentifier) -> Result<DepartmentPath, CoreError> {
        if self.contains_identifier(child) {
            return Err(CoreError::Conflict(format!(
                "Identifier '{child}' already occurs in path '{self}'"
            )));
        }
        Ok(Self(format!("{}{PATH_SEPARATOR}{child}", self.0)))
    }

    /// The parent's path, or `None` for a root path.
    pub fn parent(&self) -> Option<DepartmentPath> {
        self.0
            .rsplit_once(PATH_SEPARATOR)
            .map(|(head, _)| Self(head.to_string()))
    }

    /// The ancestor path at the given 1-based depth, or `None` if `level`
    /// is out of range.
    pub fn prefix_at_depth(&self, level: i32) -> Option<DepartmentPath> {
        if level < 1 || level > self.depth() {
            return None;
        }
        let prefix = self
            .segments()
            .take(level as usize)
            .collect::<Vec<_>>()
            .join(".");
        Some(Self(prefix))
    }

    /// True if `other` is a proper descendant path of `self`.
    pub fn is_proper_prefix_of(&self, other: &DepartmentPath) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == PATH_SEPARATOR as u8
    }

    /// Apply the subtree relocation rewrite rule to this path.
    ///
    /// If `old_prefix` is a proper prefix of `self`, replace it with
    /// `new_prefix` and return the rewritten path; otherwise `None`.
    /// The store applies the same substitution to all descendants in a
    /// single set-based UPDATE; this method is the in-process mirror used
    /// by tests and callers that hold individual nodes.
    pub fn rewrite_prefix(
        &self,
        old_prefix: &DepartmentPath,
        new_prefix: &DepartmentPath,
    ) -> Option<DepartmentPath> {
        if !old_prefix.is_proper_prefix_of(self) {
            return None;
        }
        Some(Self(format!(
            "{}{}",
            new_prefix.0,
            &self.0[old_prefix.0.len()..]
        )))
    }
}

impl fmt::Display for DepartmentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DepartmentPath {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DepartmentPath> for String {
    fn from(path: DepartmentPath) -> Self {
        path.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn id(s: &str) -> DepartmentIdentifier {
        DepartmentIdentifier::new(s).unwrap()
    }

    fn path(s: &str) -> DepartmentPath {
        DepartmentPath::parse(s).unwrap()
    }

    #[test]
    fn test_identifier_is_lowercased() {
        assert_eq!(id("Engineering").as_str(), "engineering");
    }

    #[test]
    fn test_identifier_rejects_empty() {
        assert_matches!(
            DepartmentIdentifier::new(""),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn test_identifier_rejects_non_latin() {
        assert_matches!(
            DepartmentIdentifier::new("r2d2"),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            DepartmentIdentifier::new("dëpt"),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            DepartmentIdentifier::new("a.b"),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn test_identifier_rejects_over_max_length() {
        let long = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert_matches!(
            DepartmentIdentifier::new(&long),
            Err(CoreError::Validation(_))
        );
        assert!(DepartmentIdentifier::new(&"a".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
    }

    #[test]
    fn test_parse_validates_every_segment() {
        assert!(DepartmentPath::parse("a.b.c").is_ok());
        assert_matches!(
            DepartmentPath::parse("a..c"),
            Err(CoreError::Validation(_))
        );
        assert_matches!(DepartmentPath::parse(""), Err(CoreError::Validation(_)));
    }

    #[test]
    fn test_depth_is_segment_count() {
        assert_eq!(path("a").depth(), 1);
        assert_eq!(path("a.c.d.e").depth(), 4);
    }

    #[test]
    fn test_contains_identifier_is_segment_wise() {
        let p = path("alpha.beta");
        assert!(p.contains_identifier(&id("beta")));
        assert!(p.contains_identifier(&id("BETA")));
        // "et" is a substring of a segment, not a segment
        assert!(!p.contains_identifier(&id("et")));
    }

    #[test]
    fn test_depth_level_first_occurrence() {
        let p = path("a.c.d");
        assert_eq!(p.depth_level(&id("a")).unwrap(), 1);
        assert_eq!(p.depth_level(&id("d")).unwrap(), 3);
        assert_matches!(p.depth_level(&id("x")), Err(CoreError::NotFound { .. }));
    }

    #[test]
    fn test_concat_appends_segment() {
        let p = path("a.c").concat(&id("d")).unwrap();
        assert_eq!(p.as_str(), "a.c.d");
        assert_eq!(p.depth(), 3);
    }

    #[test]
    fn test_concat_rejects_existing_segment() {
        assert_matches!(
            path("a.c").concat(&id("a")),
            Err(CoreError::Conflict(_))
        );
    }

    #[test]
    fn test_parent_drops_last_segment() {
        assert_eq!(path("a.c.d").parent().unwrap().as_str(), "a.c");
        assert_eq!(path("a").parent(), None);
    }

    #[test]
    fn test_prefix_at_depth() {
        let p = path("a.c.d.e");
        assert_eq!(p.prefix_at_depth(1).unwrap().as_str(), "a");
        assert_eq!(p.prefix_at_depth(3).unwrap().as_str(), "a.c.d");
        assert_eq!(p.prefix_at_depth(4).unwrap().as_str(), "a.c.d.e");
        assert_eq!(p.prefix_at_depth(0), None);
        assert_eq!(p.prefix_at_depth(5), None);
    }

    #[test]
    fn test_proper_prefix_requires_segment_boundary() {
        assert!(path("a.c").is_proper_prefix_of(&path("a.c.d")));
        assert!(!path("a.c").is_proper_prefix_of(&path("a.c")));
        assert!(!path("a.c").is_proper_prefix_of(&path("a.cd")));
        assert!(!path("a.c.d").is_proper_prefix_of(&path("a.c")));
    }

    #[test]
    fn test_rewrite_prefix_reroots_descendant() {
        // Moving d from a.c under a: descendants of a.c.d follow.
        let old = path("a.c.d");
        let new = path("a.d");
        assert_eq!(
            path("a.c.d.e").rewrite_prefix(&old, &new).unwrap().as_str(),
            "a.d.e"
        );
        // The subject's own path is not a proper descendant of itself.
        assert_eq!(path("a.c.d").rewrite_prefix(&old, &new), None);
        // Unrelated paths are untouched.
        assert_eq!(path("a.b").rewrite_prefix(&old, &new), None);
    }
}
