#![forbid(unsafe_code)]

//! Bindings between an observable state tree and FrankenTUI components.
//!
//! A component declares which tree locations (cursors) and which derived
//! values (facets) it depends on. Once mounted below a [`Root`], it receives
//! the current values as local state and a fresh [`StatePatch`] whenever a
//! relevant part of the tree changes.
//!
//! This crate provides:
//! - [`Root`] and [`ContextScope`] for passing a tree handle down a subtree
//! - [`BindingSpec`] for static or props-dependent binding declarations
//! - [`resolve`] to turn a spec into live [`Source`]s
//! - [`SubscriptionManager`] to keep a component's state in sync
//! - [`Branch`] to drive all of the above from host lifecycle events
//!
//! The tree itself is abstract ([`Tree`], [`Facet`]). With the
//! `test-helpers` feature, [`memory::MemoryTree`] provides an in-memory
//! implementation and [`testing::RecordingSink`] a recording state container.
//!
//! # Example
//!
//! ```ignore
//! use ftui_bind::{Branch, BindingSpec, CursorMap, Props, Root};
//!
//! let root = Root::with_tree(tree);
//! let spec = BindingSpec::new().cursors(
//!     CursorMap::new().bind("name", ["name"]).bind("surname", ["surname"]),
//! );
//! let mut branch = Branch::new(spec);
//! branch.mount(&root.scope().child(), &Props::new(), sink)?;
//! ```

pub mod branch;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod listener;
pub mod manager;
pub mod path;
pub mod resolve;
pub mod scope;
pub mod spec;
pub mod tree;

#[cfg(any(test, feature = "test-helpers"))]
pub mod memory;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use branch::{Bindable, Branch, Phase};
pub use config::BindConfig;
pub use context::{ContextScope, Root, TREE_PROP};
pub use error::{BindError, Result};
pub use host::{Prop, Props, Snapshot, StatePatch, StateSink};
pub use listener::{ListenerSet, Subscription};
pub use manager::{ManagerStats, ReconcileSummary, SubscriptionManager};
pub use path::{Path, PathSegment};
pub use resolve::{ResolvedBinding, Source, resolve};
pub use scope::BindingScope;
pub use spec::{BindingSpec, CursorMap, CursorSource, Declaration, FacetMap};
pub use tree::{ChangeSet, Cursor, Facet, FacetHandle, Listener, Tree, TreeError, TreeHandle};
