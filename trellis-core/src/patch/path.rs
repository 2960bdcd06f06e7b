//! Patch paths.
//!
//! A path is an ordered sequence of property-name segments. On the wire it
//! is an RFC 6901 JSON Pointer: segments joined by `/`, with `~` escaped as
//! `~0` and `/` as `~1`. The empty pointer `""` addresses the document root.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Ordered key sequence addressing a location inside a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(SmallVec<[String; 4]>);

impl Path {
    /// The empty path, addressing the document root.
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.0.push(segment.into());
    }

    /// A copy of this path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.push(segment);
        path
    }

    /// A copy of this path with `segment` inserted at the front.
    pub fn prefixed(&self, segment: impl Into<String>) -> Self {
        let mut segments: SmallVec<[String; 4]> = SmallVec::with_capacity(self.0.len() + 1);
        segments.push(segment.into());
        segments.extend(self.0.iter().cloned());
        Self(segments)
    }

    /// Split into the segments leading to the parent container and the final
    /// segment. `None` for the root path.
    pub fn split_last(&self) -> Option<(&str, &[String])> {
        self.0.split_last().map(|(last, parents)| (last.as_str(), parents))
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// The path without its first segment.
    pub fn tail(&self) -> Self {
        Self(self.0.iter().skip(1).cloned().collect())
    }

    /// Whether `prefix` addresses this location or one of its ancestors.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Parse an RFC 6901 pointer.
    pub fn parse(pointer: &str) -> Result<Self> {
        if pointer.is_empty() {
            return Ok(Self::root());
        }
        let rest = pointer
            .strip_prefix('/')
            .ok_or_else(|| Error::invalid_patch(format!("pointer must start with '/': {pointer}")))?;
        rest.split('/').map(unescape).collect::<Result<SmallVec<_>>>().map(Self)
    }

    /// Render as an RFC 6901 pointer.
    pub fn to_pointer(&self) -> String {
        let mut pointer = String::new();
        for segment in &self.0 {
            pointer.push('/');
            pointer.push_str(&segment.replace('~', "~0").replace('/', "~1"));
        }
        pointer
    }
}

fn unescape(segment: &str) -> Result<String> {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return Err(Error::invalid_patch(format!("invalid escape in pointer segment: {segment}"))),
        }
    }
    Ok(out)
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pointer())
    }
}

impl<S: Into<String>> FromIterator<S> for Path {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Path {
    fn from(segments: [S; N]) -> Self {
        segments.into_iter().collect()
    }
}

impl From<Vec<String>> for Path {
    fn from(segments: Vec<String>) -> Self {
        Self(SmallVec::from_vec(segments))
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_pointer())
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let pointer = String::deserialize(deserializer)?;
        Path::parse(&pointer).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_round_trip_with_escapes() {
        let path = Path::from(["a/b", "c~d", "0"]);
        assert_eq!(path.to_pointer(), "/a~1b/c~0d/0");
        assert_eq!(Path::parse("/a~1b/c~0d/0").unwrap(), path);
    }

    #[test]
    fn empty_pointer_is_root() {
        let root = Path::parse("").unwrap();
        assert!(root.is_empty());
        assert_eq!(root.to_pointer(), "");
        assert!(root.split_last().is_none());
    }

    #[test]
    fn malformed_pointers_are_rejected() {
        assert!(matches!(Path::parse("a/b"), Err(Error::InvalidPatch { .. })));
        assert!(matches!(Path::parse("/a~2"), Err(Error::InvalidPatch { .. })));
    }

    #[test]
    fn trailing_slash_addresses_empty_key() {
        let path = Path::parse("/a/").unwrap();
        assert_eq!(path.segments(), &["a".to_string(), String::new()]);
    }

    #[test]
    fn prefix_and_tail() {
        let path = Path::from(["b", "c"]);
        let prefixed = path.prefixed("a");
        assert_eq!(prefixed.to_pointer(), "/a/b/c");
        assert_eq!(prefixed.tail(), path);
        assert_eq!(prefixed.first(), Some("a"));
        assert_eq!(path.child("d").to_pointer(), "/b/c/d");
    }

    #[test]
    fn starts_with_compares_whole_segments() {
        let path = Path::from(["foo", "test"]);
        assert!(path.starts_with(&Path::from(["foo"])));
        assert!(path.starts_with(&path));
        assert!(path.starts_with(&Path::root()));
        assert!(!path.starts_with(&Path::from(["fo"])));
        assert!(!Path::from(["foo"]).starts_with(&path));
    }
}
