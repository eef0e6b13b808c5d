use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tag — dotted iteration path
// ---------------------------------------------------------------------------

/// Dotted identifier locating a token in the workflow's iteration lattice.
///
/// A tag is `segment(.segment)*` where each segment is opaque. Dropping the
/// last *d* segments projects the tag onto the enclosing iteration at depth
/// *d*. Two tokens with the same tag belong to the same iteration instance,
/// regardless of which port they travelled on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    /// The default tag for tokens created outside any iteration.
    pub fn root() -> Self {
        Tag("0".to_string())
    }

    pub fn new(tag: impl Into<String>) -> Self {
        Tag(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the segments. The empty tag has no segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|s| !s.is_empty())
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Append one segment.
    pub fn join(&self, segment: &str) -> Tag {
        if self.0.is_empty() {
            Tag(segment.to_string())
        } else {
            Tag(format!("{}.{segment}", self.0))
        }
    }

    /// Append a numeric iteration index as the last segment.
    pub fn with_index(&self, index: usize) -> Tag {
        self.join(&index.to_string())
    }

    /// The tag with the last `depth` segments removed. Dropping at least as
    /// many segments as the tag has yields the empty tag.
    pub fn drop_last(&self, depth: usize) -> Tag {
        let segments: Vec<&str> = self.segments().collect();
        let keep = segments.len().saturating_sub(depth);
        Tag(segments[..keep].join("."))
    }

    /// The enclosing iteration: `drop_last(1)`.
    pub fn prefix(&self) -> Tag {
        self.drop_last(1)
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Parse the last segment as an iteration size, as carried by
    /// iteration-termination tags (`<prefix>.<N>`).
    pub fn iteration_size(&self) -> Option<usize> {
        self.last_segment()?.parse().ok()
    }
}

impl Ord for Tag {
    /// Lexicographic on segments, each segment compared as an opaque string.
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments().cmp(other.segments())
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Tag(value.to_string())
    }
}

impl From<String> for Tag {
    fn from(value: String) -> Self {
        Tag(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_drop_round_trip() {
        let tag = Tag::from("a").with_index(3);
        assert_eq!(tag.as_str(), "a.3");
        assert_eq!(tag.prefix(), Tag::from("a"));
        assert_eq!(tag.drop_last(2).as_str(), "");
    }

    #[test]
    fn drop_more_than_depth_is_empty() {
        let tag = Tag::from("x.y");
        assert_eq!(tag.drop_last(5).as_str(), "");
        assert_eq!(tag.drop_last(5).depth(), 0);
    }

    #[test]
    fn empty_tag_has_no_segments() {
        let tag = Tag::from("");
        assert_eq!(tag.depth(), 0);
        assert_eq!(tag.last_segment(), None);
        assert_eq!(tag.join("7").as_str(), "7");
    }

    #[test]
    fn iteration_size_parses_last_segment() {
        assert_eq!(Tag::from("p.2").iteration_size(), Some(2));
        assert_eq!(Tag::from("p.x").iteration_size(), None);
    }

    #[test]
    fn ordering_is_segment_wise() {
        let mut tags = vec![Tag::from("a.2"), Tag::from("a.0"), Tag::from("a.1")];
        tags.sort();
        let sorted: Vec<&str> = tags.iter().map(Tag::as_str).collect();
        assert_eq!(sorted, vec!["a.0", "a.1", "a.2"]);
    }
}
