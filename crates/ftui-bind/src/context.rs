#![forbid(unsafe_code)]

//! Tree context propagation from a root to its descendants.
//!
//! A [`Root`] owns the slot holding the tree handle for its subtree. Every
//! component below it receives a [`ContextScope`], created by the parent with
//! [`ContextScope::child`] and passed down explicitly. A scope can read the
//! handle but never replace it; only the owning root swaps or clears it, and
//! because scopes read through the shared slot the whole subtree sees the
//! change at once.
//!
//! # Invariants
//!
//! 1. A scope created outside any root reports
//!    [`BindError::MissingTreeContext`], never an empty tree.
//! 2. Nesting depth does not matter: every scope derived from a root's scope
//!    resolves that root's handle, including through components that bind
//!    nothing.
//! 3. A root nested below another root shadows it for its own subtree.
//! 4. After the root unmounts (or is dropped), lookups in its subtree fail
//!    with `MissingTreeContext`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{BindError, Result};
use crate::host::{Prop, Props};
use crate::tree::TreeHandle;

/// Name of the property a root reads its tree from.
pub const TREE_PROP: &str = "tree";

#[derive(Default)]
struct RootSlot {
    tree: RefCell<Option<TreeHandle>>,
}

/// The tree context a component was mounted in.
#[derive(Clone, Default)]
pub struct ContextScope {
    slot: Option<Rc<RootSlot>>,
    depth: usize,
}

impl ContextScope {
    /// A scope with no root above it.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// The scope handed to a child component.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            depth: self.depth + 1,
        }
    }

    /// The tree handle supplied by the nearest root.
    pub fn tree(&self) -> Result<TreeHandle> {
        self.slot
            .as_ref()
            .and_then(|slot| slot.tree.borrow().clone())
            .ok_or(BindError::MissingTreeContext)
    }

    #[must_use]
    pub fn has_tree(&self) -> bool {
        self.tree().is_ok()
    }

    /// Distance from the scope's root (0 for the root's own scope).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl fmt::Debug for ContextScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextScope")
            .field("depth", &self.depth)
            .field("has_tree", &self.has_tree())
            .finish()
    }
}

/// A component that supplies a tree to its subtree.
pub struct Root {
    slot: Rc<RootSlot>,
    depth: usize,
}

impl Root {
    /// Mount a root from its props. The `tree` property must hold a tree
    /// handle.
    pub fn mount(props: &Props) -> Result<Self> {
        Self::mount_in(&ContextScope::detached(), props)
    }

    /// Mount a root below `parent`. Its subtree sees this root's tree, not
    /// the parent's.
    pub fn mount_in(parent: &ContextScope, props: &Props) -> Result<Self> {
        let tree = tree_from_props(props)?;
        let depth = if parent.slot.is_some() { parent.depth + 1 } else { 0 };
        tracing::debug!(depth, "tree root mounted");
        Ok(Self {
            slot: Rc::new(RootSlot {
                tree: RefCell::new(Some(tree)),
            }),
            depth,
        })
    }

    /// Convenience for mounting directly from a handle.
    #[must_use]
    pub fn with_tree(tree: TreeHandle) -> Self {
        Self {
            slot: Rc::new(RootSlot {
                tree: RefCell::new(Some(tree)),
            }),
            depth: 0,
        }
    }

    /// The scope handed to the root's direct children.
    #[must_use]
    pub fn scope(&self) -> ContextScope {
        ContextScope {
            slot: Some(Rc::clone(&self.slot)),
            depth: self.depth,
        }
    }

    #[must_use]
    pub fn tree(&self) -> Option<TreeHandle> {
        self.slot.tree.borrow().clone()
    }

    /// Apply new props. A different handle in `tree` replaces the one seen
    /// by the whole subtree; the same validation as mount applies.
    pub fn update(&mut self, props: &Props) -> Result<()> {
        let tree = tree_from_props(props)?;
        let mut slot = self.slot.tree.borrow_mut();
        let changed = slot.as_ref().is_none_or(|current| !Rc::ptr_eq(current, &tree));
        if changed {
            tracing::debug!(depth = self.depth, "tree root handle replaced");
            *slot = Some(tree);
        }
        Ok(())
    }

    /// Withdraw the tree from the subtree.
    pub fn unmount(&mut self) {
        if self.slot.tree.borrow_mut().take().is_some() {
            tracing::debug!(depth = self.depth, "tree root unmounted");
        }
    }
}

impl Drop for Root {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("depth", &self.depth)
            .field("mounted", &self.slot.tree.borrow().is_some())
            .finish()
    }
}

fn tree_from_props(props: &Props) -> Result<TreeHandle> {
    match props.get(TREE_PROP) {
        Some(Prop::Tree(tree)) => Ok(Rc::clone(tree)),
        Some(other) => Err(BindError::invalid_handle(other.kind())),
        None => Err(BindError::invalid_handle("nothing")),
    }
}
