#![forbid(unsafe_code)]

//! Turning a [`BindingSpec`] into live sources.
//!
//! Resolution evaluates both declarations for the current props, selects a
//! cursor for every path, looks up every facet by name, then overlays the
//! cursor entries on the facet entries. A key declared on both sides ends up
//! bound to its cursor.
//!
//! Resolution has no side effects other than the `select` calls it makes.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{BindError, Result};
use crate::host::Props;
use crate::path::Path;
use crate::spec::{BindingSpec, CursorSource};
use crate::tree::{self, Cursor, FacetHandle, TreeHandle};

/// A live source a local key reads from.
#[derive(Clone)]
pub enum Source {
    Cursor(Cursor),
    Facet(FacetHandle),
}

impl Source {
    /// Current value of the source.
    #[must_use]
    pub fn get(&self) -> Option<Value> {
        match self {
            Self::Cursor(cursor) => cursor.get(),
            Self::Facet(facet) => facet.get(),
        }
    }

    /// Paths whose changes may alter this source's value.
    #[must_use]
    pub fn dependencies(&self) -> Vec<Path> {
        match self {
            Self::Cursor(cursor) => vec![cursor.path().clone()],
            Self::Facet(facet) => facet.dependencies(),
        }
    }

    #[must_use]
    pub fn as_cursor(&self) -> Option<&Cursor> {
        match self {
            Self::Cursor(cursor) => Some(cursor),
            Self::Facet(_) => None,
        }
    }

    #[must_use]
    pub fn as_facet(&self) -> Option<&FacetHandle> {
        match self {
            Self::Facet(facet) => Some(facet),
            Self::Cursor(_) => None,
        }
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Cursor(a), Self::Cursor(b)) => a == b,
            (Self::Facet(a), Self::Facet(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cursor(cursor) => f.debug_tuple("Cursor").field(cursor.path()).finish(),
            Self::Facet(facet) => f.debug_tuple("Facet").field(&facet.name()).finish(),
        }
    }
}

/// Local key → live source for one component instance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedBinding {
    entries: BTreeMap<String, Source>,
}

impl ResolvedBinding {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, source: Source) {
        self.entries.insert(key.into(), source);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Source> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Source> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The cursor-backed entries.
    #[must_use]
    pub fn cursors(&self) -> BTreeMap<String, Cursor> {
        self.entries
            .iter()
            .filter_map(|(key, source)| Some((key.clone(), source.as_cursor()?.clone())))
            .collect()
    }
}

impl IntoIterator for ResolvedBinding {
    type Item = (String, Source);
    type IntoIter = btree_map::IntoIter<String, Source>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Resolve `spec` against `tree` for the given props.
pub fn resolve(spec: &BindingSpec, props: &Props, tree: &TreeHandle) -> Result<ResolvedBinding> {
    let cursors = spec.cursors.evaluate(props)?;
    let facets = spec.facets.evaluate(props)?;

    let mut binding = ResolvedBinding::new();

    for (key, name) in facets.iter() {
        let facet = tree
            .facet(name)
            .ok_or_else(|| BindError::resolution(key, format!("unknown facet `{name}`")))?;
        binding.insert(key.clone(), Source::Facet(facet));
    }

    for (key, source) in cursors.iter() {
        let cursor = match source {
            CursorSource::Cursor(cursor) => cursor.clone(),
            CursorSource::Path(path) => {
                tree::select(tree, path.clone()).map_err(|err| BindError::resolution(key, err))?
            }
        };
        if binding.get(key).is_some() {
            tracing::trace!(key = %key, "cursor overrides facet");
        }
        binding.insert(key.clone(), Source::Cursor(cursor));
    }

    tracing::trace!(
        cursors = cursors.len(),
        facets = facets.len(),
        keys = binding.len(),
        "resolved binding"
    );
    Ok(binding)
}
