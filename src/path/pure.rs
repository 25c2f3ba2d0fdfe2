use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An immutable sequence of path segments.
///
/// Unlike `std::path::PathBuf`, a `PurePath` is never tied to the local
/// filesystem: it has no root, no drive letters and uses `/` as its only
/// separator regardless of platform. Two paths are equal iff their segment
/// sequences are equal.
///
/// Empty segments are dropped when parsing, so trailing or doubled separators
/// are ignored: `"a/b/"` and `"a/b"` parse to the same path. `.` and `..`
/// segments are representable (rules may legitimately produce them as text)
/// but are rejected when a path is resolved against an output directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PurePath {
    parts: Vec<String>,
}

impl PurePath {
    /// The empty path, i.e. the root of the synchronized tree.
    pub fn root() -> Self {
        Self { parts: Vec::new() }
    }

    /// Builds a path from pre-split segments. Empty segments are dropped.
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    /// Parses a path from its string form, splitting on `/`.
    pub fn parse(s: &str) -> Self {
        Self::from_parts(s.split('/'))
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn is_root(&self) -> bool {
        self.parts.is_empty()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// The final segment, if any.
    pub fn name(&self) -> Option<&str> {
        self.parts.last().map(String::as_str)
    }

    /// The path without its final segment. The root's parent is the root.
    pub fn parent(&self) -> PurePath {
        match self.parts.split_last() {
            Some((_, init)) => PurePath::from_parts(init.iter().cloned()),
            None => PurePath::root(),
        }
    }

    /// All proper ancestors, nearest first, ending with the root.
    ///
    /// `a/b/c` yields `a/b`, `a`, and the root path.
    pub fn ancestors(&self) -> impl Iterator<Item = PurePath> + '_ {
        (0..self.parts.len())
            .rev()
            .map(move |i| PurePath::from_parts(self.parts[..i].iter().cloned()))
    }

    /// Appends a single segment.
    pub fn child(&self, name: &str) -> PurePath {
        let mut parts = self.parts.clone();
        if !name.is_empty() {
            parts.push(name.to_string());
        }
        PurePath { parts }
    }

    /// Appends all segments of `other`.
    pub fn join(&self, other: &PurePath) -> PurePath {
        let mut parts = self.parts.clone();
        parts.extend(other.parts.iter().cloned());
        PurePath { parts }
    }

    /// Prefix containment: whether `self` equals `prefix` or lies beneath it.
    pub fn starts_with(&self, prefix: &PurePath) -> bool {
        self.parts.len() >= prefix.parts.len() && self.parts[..prefix.parts.len()] == prefix.parts
    }

    /// Splits off a prefix, returning the remainder on success.
    pub fn strip_prefix(&self, prefix: &PurePath) -> Option<PurePath> {
        if self.starts_with(prefix) {
            Some(PurePath::from_parts(
                self.parts[prefix.parts.len()..].iter().cloned(),
            ))
        } else {
            None
        }
    }

    /// The first `n` segments as a path. `n` is clamped to the length.
    pub fn prefix(&self, n: usize) -> PurePath {
        let n = n.min(self.parts.len());
        PurePath::from_parts(self.parts[..n].iter().cloned())
    }

    /// The segments after the first `n` as a path.
    pub fn suffix(&self, n: usize) -> PurePath {
        let n = n.min(self.parts.len());
        PurePath::from_parts(self.parts[n..].iter().cloned())
    }
}

impl fmt::Display for PurePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parts.is_empty() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.parts.join("/"))
        }
    }
}

impl FromStr for PurePath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(PurePath::parse(s))
    }
}

impl Serialize for PurePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.parts.join("/"))
    }
}

impl<'de> Deserialize<'de> for PurePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(PurePath::parse(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let p = PurePath::parse("a/b/c");
        assert_eq!(p.parts(), &["a", "b", "c"]);
        assert_eq!(p.to_string(), "a/b/c");
    }

    #[test]
    fn test_trailing_separators_ignored() {
        assert_eq!(PurePath::parse("a/b/"), PurePath::parse("a/b"));
        assert_eq!(PurePath::parse("a//b"), PurePath::parse("a/b"));
        assert_eq!(PurePath::parse("/a/b"), PurePath::parse("a/b"));
    }

    #[test]
    fn test_root() {
        let root = PurePath::root();
        assert!(root.is_root());
        assert_eq!(root.to_string(), ".");
        assert_eq!(PurePath::parse(""), root);
        assert_eq!(PurePath::parse("/"), root);
    }

    #[test]
    fn test_equality_by_segments() {
        assert_eq!(PurePath::parse("a/b"), PurePath::from_parts(["a", "b"]));
        assert_ne!(PurePath::parse("a/b"), PurePath::parse("a/b/c"));
        assert_ne!(PurePath::parse("ab"), PurePath::parse("a/b"));
    }

    #[test]
    fn test_name_and_parent() {
        let p = PurePath::parse("a/b/c");
        assert_eq!(p.name(), Some("c"));
        assert_eq!(p.parent(), PurePath::parse("a/b"));
        assert_eq!(PurePath::root().name(), None);
        assert_eq!(PurePath::root().parent(), PurePath::root());
    }

    #[test]
    fn test_ancestors() {
        let p = PurePath::parse("a/b/c");
        let ancestors: Vec<_> = p.ancestors().collect();
        assert_eq!(
            ancestors,
            vec![
                PurePath::parse("a/b"),
                PurePath::parse("a"),
                PurePath::root()
            ]
        );
        assert_eq!(PurePath::root().ancestors().count(), 0);
    }

    #[test]
    fn test_join_and_child() {
        let p = PurePath::parse("a");
        assert_eq!(p.child("b"), PurePath::parse("a/b"));
        assert_eq!(
            p.join(&PurePath::parse("b/c")),
            PurePath::parse("a/b/c")
        );
        assert_eq!(p.join(&PurePath::root()), p);
    }

    #[test]
    fn test_starts_with() {
        let p = PurePath::parse("a/b/c");
        assert!(p.starts_with(&PurePath::parse("a")));
        assert!(p.starts_with(&PurePath::parse("a/b")));
        assert!(p.starts_with(&p));
        assert!(p.starts_with(&PurePath::root()));
        assert!(!p.starts_with(&PurePath::parse("b")));
        assert!(!p.starts_with(&PurePath::parse("a/b/c/d")));
    }

    #[test]
    fn test_strip_prefix() {
        let p = PurePath::parse("a/b/c");
        assert_eq!(
            p.strip_prefix(&PurePath::parse("a")),
            Some(PurePath::parse("b/c"))
        );
        assert_eq!(p.strip_prefix(&p), Some(PurePath::root()));
        assert_eq!(p.strip_prefix(&PurePath::parse("x")), None);
    }

    #[test]
    fn test_prefix_suffix() {
        let p = PurePath::parse("a/b/c");
        assert_eq!(p.prefix(2), PurePath::parse("a/b"));
        assert_eq!(p.suffix(2), PurePath::parse("c"));
        assert_eq!(p.prefix(0), PurePath::root());
        assert_eq!(p.suffix(0), p);
        assert_eq!(p.prefix(10), p);
    }

    #[test]
    fn test_serde_roundtrip() {
        let p = PurePath::parse("a/b/c");
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"a/b/c\"");
        let back: PurePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
