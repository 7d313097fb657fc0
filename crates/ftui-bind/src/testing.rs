#![forbid(unsafe_code)]

//! Test support: a state container that records every patch it receives.
//!
//! [`RecordingSink`] stands in for a host component's state. It applies each
//! patch to its own [`Snapshot`] and counts deliveries, so tests can assert
//! on render counts as well as the resulting state.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::host::{Snapshot, StatePatch, StateSink};

#[derive(Default)]
struct Recording {
    patches: Vec<StatePatch>,
    state: Snapshot,
}

/// Shared recorder of delivered patches. Clones observe the same log.
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Rc<RefCell<Recording>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink handle that records into this recorder.
    #[must_use]
    pub fn handle(&self) -> Rc<dyn StateSink> {
        Rc::new(self.clone())
    }

    /// Number of patches received; one patch is one re-render.
    #[must_use]
    pub fn deliveries(&self) -> usize {
        self.inner.borrow().patches.len()
    }

    /// State after applying every patch in order.
    #[must_use]
    pub fn state(&self) -> Snapshot {
        self.inner.borrow().state.clone()
    }

    #[must_use]
    pub fn patches(&self) -> Vec<StatePatch> {
        self.inner.borrow().patches.clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<StatePatch> {
        self.inner.borrow().patches.last().cloned()
    }

    /// Forget recorded patches, keeping the current state.
    pub fn clear(&self) {
        self.inner.borrow_mut().patches.clear();
    }
}

impl StateSink for RecordingSink {
    fn apply(&self, patch: StatePatch) {
        let mut recording = self.inner.borrow_mut();
        recording.state.apply(&patch);
        recording.patches.push(patch);
    }
}

impl fmt::Debug for RecordingSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let recording = self.inner.borrow();
        f.debug_struct("RecordingSink")
            .field("deliveries", &recording.patches.len())
            .field("state", &recording.state)
            .finish()
    }
}
