#![forbid(unsafe_code)]

//! Tree paths and the relation test used to route change notifications.
//!
//! A [`Path`] is an ordered sequence of object keys and array indices. Two
//! paths are *related* when one is a prefix of the other: a write below a
//! bound path changes the value read at that path, and a write above it may
//! replace it wholesale.
//!
//! # Invariants
//!
//! 1. `a.is_related(&b) == b.is_related(&a)`.
//! 2. The root path is related to every path.
//! 3. Paths are compared segment-wise; `Key("0")` and `Index(0)` differ.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tree::TreeError;

/// One step into the tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Key(k) => f.write_str(k),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// An absolute location in the tree. The empty path is the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<PathSegment>);

impl Path {
    /// The root path.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a new path one segment deeper.
    #[must_use]
    pub fn child(&self, segment: impl Into<PathSegment>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// The parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.0.split_last()?;
        Some(Self(init.to_vec()))
    }

    /// Whether `self` is equal to, or an ancestor of, `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Whether a change at one path can affect a value read at the other.
    #[must_use]
    pub fn is_related(&self, other: &Self) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }

    /// Interpret a JSON value as a path.
    ///
    /// Accepts a string (single key), a non-negative integer (single index),
    /// or an array of those.
    pub fn from_value(value: &Value) -> Result<Self, TreeError> {
        match value {
            Value::String(key) => Ok(Self::from(key.as_str())),
            Value::Number(_) => Self::segment_from_value(value).map(|s| Self(vec![s])),
            Value::Array(items) => items
                .iter()
                .map(Self::segment_from_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Self),
            other => Err(TreeError::InvalidPath {
                reason: format!("expected a key, an index or an array of them, found {other}"),
            }),
        }
    }

    fn segment_from_value(value: &Value) -> Result<PathSegment, TreeError> {
        match value {
            Value::String(key) => Ok(PathSegment::Key(key.clone())),
            Value::Number(n) => n
                .as_u64()
                .and_then(|i| usize::try_from(i).ok())
                .map(PathSegment::Index)
                .ok_or_else(|| TreeError::InvalidPath {
                    reason: format!("index {n} is not a non-negative integer"),
                }),
            other => Err(TreeError::InvalidPath {
                reason: format!("segment {other} is neither a key nor an index"),
            }),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<&str> for Path {
    fn from(key: &str) -> Self {
        Self(vec![PathSegment::from(key)])
    }
}

impl<const N: usize> From<[&str; N]> for Path {
    fn from(keys: [&str; N]) -> Self {
        Self(keys.into_iter().map(PathSegment::from).collect())
    }
}

impl From<&[&str]> for Path {
    fn from(keys: &[&str]) -> Self {
        Self(keys.iter().copied().map(PathSegment::from).collect())
    }
}

impl From<Vec<PathSegment>> for Path {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl TryFrom<&Value> for Path {
    type Error = TreeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}
