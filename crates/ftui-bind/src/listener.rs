#![forbid(unsafe_code)]

//! Listener registration with RAII release.
//!
//! [`Subscription`] is the release handle every [`Tree::watch`] returns.
//! [`ListenerSet`] is a ready-made registry tree implementations can use to
//! hand those handles out.
//!
//! # Invariants
//!
//! 1. Dropping (or [`release`](Subscription::release)-ing) a `Subscription`
//!    removes its listener before the next emission starts.
//! 2. Listeners are invoked in registration order.
//! 3. An emission in progress calls the listeners that were registered when
//!    it started; consumers that must stop immediately keep their own
//!    liveness flag.
//!
//! [`Tree::watch`]: crate::tree::Tree::watch

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::tree::{ChangeSet, Listener};

/// Release handle for a registered listener. Unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Wrap a release action.
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A subscription with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Release now instead of at drop.
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.release.is_some())
            .finish()
    }
}

#[derive(Default)]
struct ListenerSetInner {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Registration-ordered set of change listeners.
#[derive(Clone, Default)]
pub struct ListenerSet {
    inner: Rc<RefCell<ListenerSetInner>>,
}

impl ListenerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`; the returned guard removes it.
    pub fn add(&self, listener: Listener) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push((id, listener));
            id
        };
        let weak: Weak<RefCell<ListenerSetInner>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().listeners.retain(|(lid, _)| *lid != id);
            }
        })
    }

    /// Call every listener registered at the time of the call.
    ///
    /// The registry is not borrowed while listeners run, so a listener may
    /// subscribe or unsubscribe re-entrantly.
    pub fn emit(&self, changes: &ChangeSet) {
        let listeners: Vec<Listener> = self
            .inner
            .borrow()
            .listeners
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            listener(changes);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.len())
            .finish()
    }
}
