use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::types::Ordinal;

/// Scalar stored in rows and in hierarchical key segments.
///
/// Ordering is `Null < Int < Text`, which is the storage order for key
/// components of mixed type.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// SQL null.
    Null,
    /// Signed integer.
    Int(i64),
    /// UTF-8 text.
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "'{v}'"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

/// One level of a hierarchical key: the table ordinal followed by that
/// table's key columns.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HKeySegment {
    ordinal: Ordinal,
    values: SmallVec<[Value; 2]>,
}

impl HKeySegment {
    /// Creates a segment for `ordinal` with the given key columns.
    pub fn new(ordinal: Ordinal, values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            ordinal,
            values: values.into_iter().collect(),
        }
    }

    /// Table ordinal tagging this segment.
    pub fn ordinal(&self) -> Ordinal {
        self.ordinal
    }

    /// Key columns of this segment.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    fn is_prefix_of(&self, other: &HKeySegment) -> bool {
        self.ordinal == other.ordinal
            && self.values.len() <= other.values.len()
            && self.values[..] == other.values[..self.values.len()]
    }
}

impl Ord for HKeySegment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal
            .cmp(&other.ordinal)
            .then_with(|| self.values[..].cmp(&other.values[..]))
    }
}

impl PartialOrd for HKeySegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Hierarchical key: the path of a row from the group root down to its table.
///
/// A row of a table at depth `d` has `d + 1` segments. Keys order
/// lexicographically by segment, so every row of a subtree sorts directly
/// after the subtree root and before the root's next sibling.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HKey {
    segments: SmallVec<[HKeySegment; 4]>,
}

impl HKey {
    /// Creates an empty key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a key from its segments, root first.
    pub fn from_segments(segments: impl IntoIterator<Item = HKeySegment>) -> Self {
        Self {
            segments: segments.into_iter().collect(),
        }
    }

    /// Appends a segment; returns `self` for chaining.
    pub fn push(mut self, ordinal: Ordinal, values: impl IntoIterator<Item = Value>) -> Self {
        self.segments.push(HKeySegment::new(ordinal, values));
        self
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Segments of the key, root first.
    pub fn segments(&self) -> &[HKeySegment] {
        &self.segments
    }

    /// Shortens the key to `segments` segments. Longer requests are a no-op.
    pub fn truncate(&mut self, segments: usize) {
        self.segments.truncate(segments);
    }

    /// Returns the key of the ancestor at hierarchy `depth`.
    pub fn ancestor(&self, depth: usize) -> HKey {
        let mut key = self.clone();
        key.truncate(depth + 1);
        key
    }

    /// Appends a bare ordinal, addressing the subtree of one child table.
    pub fn extend_with_ordinal(&mut self, ordinal: Ordinal) {
        self.segments.push(HKeySegment::new(ordinal, []));
    }

    /// Overwrites `target` with this key, reusing its allocation.
    pub fn copy_to(&self, target: &mut HKey) {
        target.segments.clone_from(&self.segments);
    }

    /// Returns `true` when `other` lies in the subtree addressed by this key.
    ///
    /// The last segment of `self` may be partial (only an ordinal, or only a
    /// leading subset of the key columns).
    pub fn is_prefix_of(&self, other: &HKey) -> bool {
        let Some((last, head)) = self.segments.split_last() else {
            return true;
        };
        if other.segments.len() < self.segments.len() {
            return false;
        }
        head.iter().zip(other.segments.iter()).all(|(a, b)| a == b)
            && last.is_prefix_of(&other.segments[head.len()])
    }
}

impl fmt::Display for HKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", segment.ordinal)?;
            for value in segment.values.iter() {
                write!(f, ",({value})")?;
            }
        }
        f.write_str("}")
    }
}
