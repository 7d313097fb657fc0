#![forbid(unsafe_code)]

//! Scoped ownership of tree subscriptions.
//!
//! A [`BindingScope`] collects the [`Subscription`]s one component instance
//! acquires. Dropping or clearing the scope releases all of them, so every
//! exit path out of an active binding, including an error in the middle of
//! a reconcile, detaches its listeners.
//!
//! # Usage
//!
//! ```ignore
//! let mut scope = BindingScope::new();
//! scope.watch(&tree, Rc::new(|changes: &ChangeSet| println!("{changes:?}")));
//!
//! // When scope drops, all subscriptions are released.
//! ```
//!
//! # Invariants
//!
//! 1. Subscriptions are released in reverse registration order.
//! 2. After drop or `clear()`, no listener acquired through this scope fires
//!    for a batch that starts afterwards.
//! 3. `clear()` leaves the scope empty and reusable.

use std::fmt;

use crate::listener::Subscription;
use crate::tree::{Listener, TreeHandle};

pub struct BindingScope {
    subscriptions: Vec<Subscription>,
}

impl BindingScope {
    /// Create an empty binding scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    /// Hold `sub` until the scope is dropped or cleared.
    pub fn hold(&mut self, sub: Subscription) {
        self.subscriptions.push(sub);
    }

    /// Register `listener` on `tree` within this scope.
    pub fn watch(&mut self, tree: &TreeHandle, listener: Listener) -> &mut Self {
        let sub = tree.watch(listener);
        self.subscriptions.push(sub);
        self
    }

    /// Number of live subscriptions in this scope.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Release all subscriptions immediately.
    pub fn clear(&mut self) {
        while let Some(sub) = self.subscriptions.pop() {
            sub.release();
        }
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl Default for BindingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.subscriptions.len())
            .finish()
    }
}
