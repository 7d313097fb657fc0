#![forbid(unsafe_code)]

//! The observable tree contract consumed by the binding core.
//!
//! The tree itself is an external collaborator. This module only names what
//! the core needs from it: path reads, cursor selection, a facet registry,
//! a mutation entry point for cursor writes, and change notification with
//! the set of paths each batch touched.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;

use crate::listener::Subscription;
use crate::path::Path;

/// Shared handle to a tree. Components share it; none of them own it.
pub type TreeHandle = Rc<dyn Tree>;

/// Shared handle to a facet registered on a tree.
pub type FacetHandle = Rc<dyn Facet>;

/// Callback invoked with each notification batch.
pub type Listener = Rc<dyn Fn(&ChangeSet)>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("cannot select `{path}`: {reason}")]
    Unselectable { path: Path, reason: String },

    #[error("invalid path: {reason}")]
    InvalidPath { reason: String },
}

/// An observable hierarchical store.
pub trait Tree {
    /// Read the value at `path`, or `None` if nothing is stored there.
    fn get(&self, path: &Path) -> Option<Value>;

    /// Check that `path` can address a location in this tree.
    ///
    /// Implementations reject paths that step through a scalar.
    fn check_path(&self, path: &Path) -> Result<(), TreeError>;

    /// Write `value` at `path` through the tree's own mutation path.
    fn set(&self, path: &Path, value: Value) -> Result<(), TreeError>;

    /// Look up a registered facet by name.
    fn facet(&self, name: &str) -> Option<FacetHandle>;

    /// Register a change listener. Dropping the returned guard removes it.
    fn watch(&self, listener: Listener) -> Subscription;
}

/// Select a cursor at `path` on a shared tree handle.
pub fn select(tree: &TreeHandle, path: impl Into<Path>) -> Result<Cursor, TreeError> {
    let path = path.into();
    tree.check_path(&path)?;
    Ok(Cursor {
        tree: Rc::clone(tree),
        path,
    })
}

/// A handle bound to a fixed path in a tree.
///
/// Two cursors are equal when they address the same path of the same tree
/// instance.
#[derive(Clone)]
pub struct Cursor {
    tree: TreeHandle,
    path: Path,
}

impl Cursor {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn tree(&self) -> &TreeHandle {
        &self.tree
    }

    /// Current value at the cursor's path.
    #[must_use]
    pub fn get(&self) -> Option<Value> {
        self.tree.get(&self.path)
    }

    /// Write through the tree at the cursor's path.
    pub fn set(&self, value: impl Into<Value>) -> Result<(), TreeError> {
        self.tree.set(&self.path, value.into())
    }

    /// Select a cursor below this one.
    pub fn select(&self, relative: impl Into<Path>) -> Result<Cursor, TreeError> {
        let relative = relative.into();
        let mut segments = self.path.segments().to_vec();
        segments.extend(relative.segments().iter().cloned());
        select(&self.tree, Path::new(segments))
    }

    /// Whether both cursors were selected from the same tree instance.
    #[must_use]
    pub fn same_tree(&self, tree: &TreeHandle) -> bool {
        Rc::ptr_eq(&self.tree, tree)
    }
}

impl PartialEq for Cursor {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree) && self.path == other.path
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").field("path", &self.path).finish()
    }
}

/// A named value derived from tree data, recomputed by the tree.
pub trait Facet {
    fn name(&self) -> &str;

    /// Current derived value.
    fn get(&self) -> Option<Value>;

    /// Paths the facet is computed from. A change related to any of them
    /// may change the facet's value. An empty set means the facet does not
    /// depend on tree data.
    fn dependencies(&self) -> Vec<Path>;
}

/// The paths written during one notification batch, kept in path order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    paths: BTreeSet<Path>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a changed path. Duplicates are dropped.
    pub fn push(&mut self, path: Path) {
        self.paths.insert(path);
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Whether any changed path is related to any of `dependencies`.
    #[must_use]
    pub fn affects(&self, dependencies: &[Path]) -> bool {
        dependencies.iter().any(|dep| self.touches(dep))
    }

    /// Paths sharing a prefix are contiguous in path order, so the first
    /// entry at or after `dep` settles the descendant case.
    fn touches(&self, dep: &Path) -> bool {
        let descendant = self
            .paths
            .range::<Path, _>(dep..)
            .next()
            .is_some_and(|changed| dep.is_prefix_of(changed));
        descendant
            || (0..dep.len())
                .any(|n| self.paths.contains(&Path::new(dep.segments()[..n].to_vec())))
    }
}

impl FromIterator<Path> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = Path>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}
