#![forbid(unsafe_code)]

//! Live subscriptions for one mounted component instance.
//!
//! A [`SubscriptionManager`] owns the resolved sources of a component, the
//! tree listeners feeding them, and the component's current [`Snapshot`].
//! The tree the binding was resolved against is watched through a
//! [`BindingScope`]; a ready-made cursor over some other tree gets a listener
//! on that tree too, so every source is observed where it reads. Each tree
//! batch is routed to the entries that read from that tree and whose
//! dependency paths are related to a changed path; only those are
//! recomputed, and the results go to the host as a single [`StatePatch`].
//!
//! # Invariants
//!
//! 1. Activation delivers the initial snapshot before it returns.
//! 2. At most one patch is delivered per tree batch.
//! 3. Unaffected keys keep their previous values.
//! 4. After [`deactivate`](SubscriptionManager::deactivate) nothing is
//!    delivered, including for a batch that was already queued or is
//!    already being emitted.
//! 5. Reconciling leaves entries whose source did not change untouched.
//!
//! # Failure Modes
//!
//! - **Tree dropped while active**: the listener goes with it; the snapshot
//!   keeps its last values.
//! - **Sink re-enters the tree**: allowed. No internal borrow is held while
//!   the sink runs, so a nested batch is handled like any other.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::config::BindConfig;
use crate::host::{Snapshot, StatePatch, StateSink};
use crate::listener::Subscription;
use crate::path::Path;
use crate::resolve::{ResolvedBinding, Source};
use crate::scope::BindingScope;
use crate::tree::{ChangeSet, Cursor, Listener, Tree, TreeHandle};

/// Counters describing what a manager has done.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Patches handed to the sink, the initial snapshot included.
    pub deliveries: u64,
    /// Individual source reads.
    pub recomputations: u64,
    /// Batches that touched no bound path.
    pub skipped: u64,
    /// Batches that arrived after deactivation.
    pub ignored: u64,
}

/// What a reconcile changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: Vec<String>,
    pub replaced: Vec<String>,
    pub removed: Vec<String>,
    pub kept: usize,
}

impl ReconcileSummary {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.replaced.is_empty() && self.removed.is_empty()
    }
}

struct Entry {
    source: Source,
    /// The tree whose batches can change this entry.
    origin: TreeHandle,
    dependencies: Vec<Path>,
}

impl Entry {
    fn new(source: Source, tree: &TreeHandle) -> Self {
        let dependencies = source.dependencies();
        let origin = match &source {
            Source::Cursor(cursor) => Rc::clone(cursor.tree()),
            Source::Facet(_) => Rc::clone(tree),
        };
        Self {
            source,
            origin,
            dependencies,
        }
    }
}

struct ManagerInner {
    config: BindConfig,
    tree: TreeHandle,
    sink: Rc<dyn StateSink>,
    entries: RefCell<BTreeMap<String, Entry>>,
    snapshot: RefCell<Snapshot>,
    active: Cell<bool>,
    stats: Cell<ManagerStats>,
}

impl ManagerInner {
    fn bump(&self, f: impl FnOnce(&mut ManagerStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    /// Read `sources`, fold the results into the snapshot, and return the
    /// patch plus whether any value differs from what the snapshot held.
    fn recompute(&self, sources: Vec<(String, Source)>) -> (StatePatch, bool) {
        let mut patch = StatePatch::new();
        let mut changed = false;
        for (key, source) in sources {
            let value = source.get();
            self.bump(|s| s.recomputations += 1);
            if self.snapshot.borrow().get(&key) != value.as_ref() {
                changed = true;
            }
            patch.set(key, value);
        }
        self.snapshot.borrow_mut().apply(&patch);
        (patch, changed)
    }

    fn deliver(&self, patch: StatePatch) {
        self.bump(|s| s.deliveries += 1);
        self.sink.apply(patch);
    }

    fn on_changes(&self, origin: &TreeHandle, changes: &ChangeSet) {
        if !self.active.get() {
            self.bump(|s| s.ignored += 1);
            tracing::trace!(
                instance = self.config.label(),
                "dropping notification for deactivated binding"
            );
            return;
        }

        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!(
            "binding_notify",
            instance = self.config.label(),
            changed = changes.len()
        )
        .entered();

        let affected: Vec<(String, Source)> = self
            .entries
            .borrow()
            .iter()
            .filter(|(_, entry)| {
                Rc::ptr_eq(&entry.origin, origin) && changes.affects(&entry.dependencies)
            })
            .map(|(key, entry)| (key.clone(), entry.source.clone()))
            .collect();

        if affected.is_empty() {
            self.bump(|s| s.skipped += 1);
            return;
        }

        tracing::debug!(
            instance = self.config.label(),
            changed = changes.len(),
            affected = affected.len(),
            "tree batch touches bound keys"
        );

        let (patch, changed) = self.recompute(affected);
        if !changed && !self.config.deliver_unchanged {
            return;
        }
        self.deliver(patch);
    }
}

fn listener(inner: &Rc<ManagerInner>, tree: &TreeHandle) -> Listener {
    let weak: Weak<ManagerInner> = Rc::downgrade(inner);
    let origin = Rc::downgrade(tree);
    Rc::new(move |changes: &ChangeSet| {
        if let (Some(inner), Some(origin)) = (weak.upgrade(), origin.upgrade()) {
            inner.on_changes(&origin, changes);
        }
    })
}

/// Owner of one component instance's live bindings.
pub struct SubscriptionManager {
    inner: Rc<ManagerInner>,
    scope: BindingScope,
    /// Listeners on trees other than the one the binding was resolved on.
    foreign: Vec<(TreeHandle, Subscription)>,
}

impl SubscriptionManager {
    /// Subscribe every entry of `binding` and deliver the initial snapshot
    /// to `sink` before returning.
    pub fn activate(
        tree: TreeHandle,
        binding: ResolvedBinding,
        sink: Rc<dyn StateSink>,
        config: BindConfig,
    ) -> Self {
        Self::activate_replacing(tree, binding, sink, config, &[])
    }

    /// Like [`activate`](Self::activate), but the initial patch also clears
    /// every key of `stale` that `binding` does not bind. A sink that held
    /// the state of an earlier binding then sees one patch for the switch.
    pub fn activate_replacing(
        tree: TreeHandle,
        binding: ResolvedBinding,
        sink: Rc<dyn StateSink>,
        config: BindConfig,
        stale: &[String],
    ) -> Self {
        let entries: BTreeMap<String, Entry> = binding
            .into_iter()
            .map(|(key, source)| (key, Entry::new(source, &tree)))
            .collect();

        let inner = Rc::new(ManagerInner {
            config,
            tree: Rc::clone(&tree),
            sink,
            entries: RefCell::new(entries),
            snapshot: RefCell::new(Snapshot::new()),
            active: Cell::new(true),
            stats: Cell::new(ManagerStats::default()),
        });

        let mut scope = BindingScope::new();
        scope.watch(&tree, listener(&inner, &tree));
        let mut manager = Self {
            inner,
            scope,
            foreign: Vec::new(),
        };
        manager.sync_foreign();

        let inner = &manager.inner;
        let initial: Vec<(String, Source)> = inner
            .entries
            .borrow()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.source.clone()))
            .collect();
        let (mut patch, _) = inner.recompute(initial);
        for key in stale {
            if patch.get(key).is_none() {
                patch.set(key.clone(), None);
            }
        }

        tracing::debug!(
            instance = inner.config.label(),
            keys = patch.len(),
            foreign_trees = manager.foreign.len(),
            "binding activated"
        );
        inner.deliver(patch);

        manager
    }

    /// Watch exactly the foreign trees the current entries read from.
    fn sync_foreign(&mut self) {
        let mut wanted: Vec<TreeHandle> = Vec::new();
        for entry in self.inner.entries.borrow().values() {
            let foreign = !Rc::ptr_eq(&entry.origin, &self.inner.tree);
            if foreign && !wanted.iter().any(|t| Rc::ptr_eq(t, &entry.origin)) {
                wanted.push(Rc::clone(&entry.origin));
            }
        }

        self.foreign
            .retain(|(tree, _)| wanted.iter().any(|t| Rc::ptr_eq(t, tree)));
        for tree in wanted {
            if !self.foreign.iter().any(|(t, _)| Rc::ptr_eq(t, &tree)) {
                let sub = tree.watch(listener(&self.inner, &tree));
                self.foreign.push((tree, sub));
            }
        }
    }

    /// Replace the binding with `binding`, touching only what differs.
    ///
    /// Facets are expected to come from the tree the manager was activated
    /// on; cursors may read any tree. Delivers at most one patch.
    pub fn reconcile(&mut self, binding: ResolvedBinding) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        if !self.inner.active.get() {
            tracing::warn!(
                instance = self.inner.config.label(),
                "reconcile on a deactivated binding ignored"
            );
            return summary;
        }

        let mut patch = StatePatch::new();
        let mut fresh: Vec<(String, Source)> = Vec::new();
        {
            let mut entries = self.inner.entries.borrow_mut();
            let stale: Vec<String> = entries
                .keys()
                .filter(|key| binding.get(key).is_none())
                .cloned()
                .collect();
            for key in stale {
                entries.remove(&key);
                patch.set(key.clone(), None);
                summary.removed.push(key);
            }

            for (key, source) in binding {
                match entries.get(&key) {
                    Some(entry) if entry.source == source => summary.kept += 1,
                    Some(_) => {
                        entries.insert(key.clone(), Entry::new(source.clone(), &self.inner.tree));
                        summary.replaced.push(key.clone());
                        fresh.push((key, source));
                    }
                    None => {
                        entries.insert(key.clone(), Entry::new(source.clone(), &self.inner.tree));
                        summary.added.push(key.clone());
                        fresh.push((key, source));
                    }
                }
            }
        }

        self.sync_foreign();
        self.inner.snapshot.borrow_mut().apply(&patch);
        let (computed, _) = self.inner.recompute(fresh);
        for (key, value) in computed.iter() {
            patch.set(key, value.cloned());
        }

        tracing::debug!(
            instance = self.inner.config.label(),
            added = summary.added.len(),
            replaced = summary.replaced.len(),
            removed = summary.removed.len(),
            kept = summary.kept,
            "binding reconciled"
        );

        if !patch.is_empty() {
            self.inner.deliver(patch);
        }
        summary
    }

    /// Release every listener. Later calls are no-ops.
    pub fn deactivate(&mut self) {
        if !self.inner.active.replace(false) {
            return;
        }
        self.scope.clear();
        self.foreign.clear();
        self.inner.entries.borrow_mut().clear();
        tracing::debug!(instance = self.inner.config.label(), "binding deactivated");
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// The live cursor of every cursor-backed key.
    #[must_use]
    pub fn cursors(&self) -> BTreeMap<String, Cursor> {
        self.inner
            .entries
            .borrow()
            .iter()
            .filter_map(|(key, entry)| Some((key.clone(), entry.source.as_cursor()?.clone())))
            .collect()
    }

    /// The live source bound to `key`.
    #[must_use]
    pub fn source(&self, key: &str) -> Option<Source> {
        self.inner
            .entries
            .borrow()
            .get(key)
            .map(|entry| entry.source.clone())
    }

    /// Bound keys in order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn tree(&self) -> &TreeHandle {
        &self.inner.tree
    }

    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        self.inner.stats.get()
    }

    /// Number of tree listeners this manager currently holds.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.scope.binding_count() + self.foreign.len()
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("instance", &self.inner.config.label())
            .field("active", &self.inner.active.get())
            .field("keys", &self.keys())
            .field("stats", &self.inner.stats.get())
            .finish()
    }
}
