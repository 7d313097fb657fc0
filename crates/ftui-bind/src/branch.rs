#![forbid(unsafe_code)]

//! Lifecycle adapter for bound components.
//!
//! A [`Branch`] is the binding state of one component instance. The host
//! framework forwards its lifecycle events to it:
//!
//! | Host event | Branch call | Effect |
//! |------------|-------------|--------|
//! | mount | [`Branch::mount`] | look up tree, resolve spec, activate |
//! | props changed | [`Branch::update`] | re-resolve and reconcile if needed |
//! | unmount | [`Branch::unmount`] | release every listener |
//!
//! # State machine
//!
//! ```text
//! Unmounted → Resolving → Active → [Reconciling → Active]* → Deactivated
//! ```
//!
//! `Deactivated` is terminal. A failure while resolving (at mount or during
//! a reconcile) is fatal for the instance: it ends in `Deactivated` holding
//! no listeners, and the error is returned to the caller.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::config::BindConfig;
use crate::context::ContextScope;
use crate::error::{BindError, Result};
use crate::host::{Props, Snapshot, StateSink};
use crate::manager::{ManagerStats, ReconcileSummary, SubscriptionManager};
use crate::resolve::{ResolvedBinding, Source, resolve};
use crate::spec::BindingSpec;
use crate::tree::{Cursor, TreeHandle};

/// Lifecycle phase of a bound component instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unmounted,
    Resolving,
    Active,
    Reconciling,
    Deactivated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unmounted => "Unmounted",
            Self::Resolving => "Resolving",
            Self::Active => "Active",
            Self::Reconciling => "Reconciling",
            Self::Deactivated => "Deactivated",
        };
        f.write_str(name)
    }
}

/// A component type that declares tree bindings.
///
/// Components implement this and delegate their lifecycle to a [`Branch`]
/// built with [`Branch::for_component`].
pub trait Bindable {
    fn binding_spec(&self) -> BindingSpec;

    fn bind_config(&self) -> BindConfig {
        BindConfig::default()
    }
}

/// Binding state of one component instance.
pub struct Branch {
    spec: BindingSpec,
    config: BindConfig,
    phase: Phase,
    scope: ContextScope,
    props: Props,
    sink: Option<Rc<dyn StateSink>>,
    manager: Option<SubscriptionManager>,
}

impl Branch {
    #[must_use]
    pub fn new(spec: BindingSpec) -> Self {
        Self::with_config(spec, BindConfig::default())
    }

    #[must_use]
    pub fn with_config(spec: BindingSpec, config: BindConfig) -> Self {
        Self {
            spec,
            config,
            phase: Phase::Unmounted,
            scope: ContextScope::detached(),
            props: Props::new(),
            sink: None,
            manager: None,
        }
    }

    /// Build the branch for a [`Bindable`] component.
    #[must_use]
    pub fn for_component<C: Bindable + ?Sized>(component: &C) -> Self {
        Self::with_config(component.binding_spec(), component.bind_config())
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase == Phase::Active
    }

    /// Mount in `scope` with initial `props`. The initial snapshot reaches
    /// `sink` before this returns.
    pub fn mount(
        &mut self,
        scope: &ContextScope,
        props: &Props,
        sink: Rc<dyn StateSink>,
    ) -> Result<()> {
        self.expect_phase(Phase::Unmounted, "mount")?;
        self.phase = Phase::Resolving;
        self.scope = scope.clone();
        self.props = props.clone();

        let resolved = self.scope.tree().and_then(|tree| {
            let binding = resolve(&self.spec, props, &tree)?;
            Ok((tree, binding))
        });
        let (tree, binding) = match resolved {
            Ok(ok) => ok,
            Err(err) => {
                tracing::warn!(instance = self.config.label(), error = %err, "mount failed");
                self.phase = Phase::Deactivated;
                return Err(err);
            }
        };

        self.manager = Some(SubscriptionManager::activate(
            tree,
            binding,
            Rc::clone(&sink),
            self.config.clone(),
        ));
        self.sink = Some(sink);
        self.phase = Phase::Active;
        Ok(())
    }

    /// Resolve the binding spec for `props` against the current context without
    /// touching live subscriptions.
    pub fn resolve_bindings(&self, props: &Props) -> Result<ResolvedBinding> {
        let tree = self.scope.tree()?;
        resolve(&self.spec, props, &tree)
    }

    /// Apply new props.
    ///
    /// Re-resolves when the binding spec depends on props or the root swapped its
    /// tree; otherwise this only records the props. Entries whose source is
    /// unchanged keep their subscriptions.
    pub fn update(&mut self, props: &Props) -> Result<ReconcileSummary> {
        self.expect_phase(Phase::Active, "update")?;

        let tree = match self.scope.tree() {
            Ok(tree) => tree,
            Err(err) => return Err(self.fail(err)),
        };
        let tree_changed = self
            .manager
            .as_ref()
            .is_none_or(|manager| !Rc::ptr_eq(manager.tree(), &tree));

        self.props = props.clone();
        if !self.spec.is_dynamic() && !tree_changed {
            return Ok(ReconcileSummary::default());
        }

        self.phase = Phase::Reconciling;
        let binding = match resolve(&self.spec, props, &tree) {
            Ok(binding) => binding,
            Err(err) => return Err(self.fail(err)),
        };

        let summary = if tree_changed {
            self.rebind(tree, binding)
        } else {
            match self.manager.as_mut() {
                Some(manager) => manager.reconcile(binding),
                None => ReconcileSummary::default(),
            }
        };
        self.phase = Phase::Active;
        Ok(summary)
    }

    /// Release every listener. Only the first call has an effect.
    pub fn unmount(&mut self) {
        if self.phase == Phase::Deactivated {
            return;
        }
        if let Some(mut manager) = self.manager.take() {
            manager.deactivate();
        }
        self.sink = None;
        self.phase = Phase::Deactivated;
    }

    /// Current state of the bound keys.
    #[must_use]
    pub fn state(&self) -> Snapshot {
        self.snapshot()
    }

    /// Current snapshot; empty before mount and after unmount.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.manager
            .as_ref()
            .map(SubscriptionManager::snapshot)
            .unwrap_or_default()
    }

    /// The live cursors, for direct reads and writes.
    #[must_use]
    pub fn cursors(&self) -> BTreeMap<String, Cursor> {
        self.manager
            .as_ref()
            .map(SubscriptionManager::cursors)
            .unwrap_or_default()
    }

    /// The live cursor bound to `key`.
    #[must_use]
    pub fn cursor(&self, key: &str) -> Option<Cursor> {
        self.source(key)?.as_cursor().cloned()
    }

    #[must_use]
    pub fn source(&self, key: &str) -> Option<Source> {
        self.manager.as_ref()?.source(key)
    }

    /// The tree this instance is bound to.
    #[must_use]
    pub fn tree(&self) -> Option<TreeHandle> {
        self.manager.as_ref().map(|m| Rc::clone(m.tree()))
    }

    #[must_use]
    pub fn props(&self) -> &Props {
        &self.props
    }

    #[must_use]
    pub fn stats(&self) -> Option<ManagerStats> {
        self.manager.as_ref().map(SubscriptionManager::stats)
    }

    fn expect_phase(&self, expected: Phase, event: &'static str) -> Result<()> {
        if self.phase == expected {
            return Ok(());
        }
        tracing::warn!(
            instance = self.config.label(),
            phase = %self.phase,
            event,
            "lifecycle event rejected"
        );
        Err(BindError::Lifecycle {
            phase: self.phase.to_string(),
            event,
        })
    }

    fn fail(&mut self, err: BindError) -> BindError {
        tracing::warn!(instance = self.config.label(), error = %err, "binding failed");
        self.unmount();
        err
    }

    /// Move to a different tree: activate a fresh manager against `tree`
    /// whose initial patch also clears keys that no longer exist.
    fn rebind(&mut self, tree: TreeHandle, binding: ResolvedBinding) -> ReconcileSummary {
        let old_keys = match self.manager.take() {
            Some(mut manager) => {
                let keys = manager.keys();
                manager.deactivate();
                keys
            }
            None => Vec::new(),
        };
        let Some(sink) = self.sink.clone() else {
            return ReconcileSummary::default();
        };

        let removed: Vec<String> = old_keys
            .into_iter()
            .filter(|key| binding.get(key).is_none())
            .collect();

        let added: Vec<String> = binding.keys().map(str::to_owned).collect();
        tracing::debug!(
            instance = self.config.label(),
            keys = added.len(),
            "rebinding to replaced tree"
        );
        self.manager = Some(SubscriptionManager::activate_replacing(
            tree,
            binding,
            sink,
            self.config.clone(),
            &removed,
        ));
        ReconcileSummary {
            added,
            replaced: Vec::new(),
            removed,
            kept: 0,
        }
    }
}

impl Drop for Branch {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl fmt::Debug for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch")
            .field("instance", &self.config.label())
            .field("phase", &self.phase)
            .field("spec", &self.spec)
            .field("manager", &self.manager)
            .finish()
    }
}
