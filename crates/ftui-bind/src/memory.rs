#![forbid(unsafe_code)]

//! In-memory reference tree for tests and examples.
//!
//! [`MemoryTree`] implements [`Tree`] over a `serde_json::Value` document,
//! with two delivery modes and memoized facets.
//!
//! # Delivery modes
//!
//! - **Synchronous** (default): every write emits a one-path [`ChangeSet`]
//!   before `set` returns, unless a [`TreeBatch`] guard is open, in which
//!   case the outermost guard's drop emits one merged batch.
//! - **Asynchronous**: writes are queued and delivered as one batch by
//!   [`MemoryTree::flush`], standing in for a next-tick commit.
//!
//! # Facets
//!
//! A facet is registered from a [`FacetDescriptor`]: named dependency paths
//! plus a projection over their current values. The projected value is
//! cached and invalidated by any write related to a dependency, in the manner
//! of a lazily recomputed derived value.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::listener::{ListenerSet, Subscription};
use crate::path::{Path, PathSegment};
use crate::tree::{self, ChangeSet, Cursor, Facet, FacetHandle, Listener, Tree, TreeError, TreeHandle};

/// Construction options for [`MemoryTree`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeOptions {
    /// Queue writes until [`MemoryTree::flush`] instead of emitting inline.
    pub asynchronous: bool,
}

impl TreeOptions {
    #[must_use]
    pub fn asynchronous() -> Self {
        Self { asynchronous: true }
    }
}

type Projection = Rc<dyn Fn(&Map<String, Value>) -> Value>;

/// Declaration of a facet: named dependency cursors and a projection.
#[derive(Clone)]
pub struct FacetDescriptor {
    name: String,
    cursors: Vec<(String, Path)>,
    project: Projection,
}

impl FacetDescriptor {
    /// A facet with no dependencies whose value is `null` until a projection
    /// is set with [`get`](Self::get).
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cursors: Vec::new(),
            project: Rc::new(|_: &Map<String, Value>| Value::Null),
        }
    }

    /// Add a dependency, exposed to the projection under `key`.
    #[must_use]
    pub fn cursor(mut self, key: impl Into<String>, path: impl Into<Path>) -> Self {
        self.cursors.push((key.into(), path.into()));
        self
    }

    /// Set the projection. It receives the present dependency values.
    #[must_use]
    pub fn get(mut self, project: impl Fn(&Map<String, Value>) -> Value + 'static) -> Self {
        self.project = Rc::new(project);
        self
    }
}

impl fmt::Debug for FacetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacetDescriptor")
            .field("name", &self.name)
            .field("cursors", &self.cursors)
            .finish()
    }
}

struct MemoryFacet {
    name: String,
    cursors: Vec<(String, Path)>,
    project: Projection,
    data: Rc<RefCell<Value>>,
    cached: RefCell<Option<Value>>,
    dirty: Cell<bool>,
    computations: Cell<u64>,
}

impl MemoryFacet {
    fn invalidate_if_related(&self, changed: &Path) {
        if self.cursors.iter().any(|(_, dep)| dep.is_related(changed)) {
            self.dirty.set(true);
        }
    }
}

impl Facet for MemoryFacet {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self) -> Option<Value> {
        if self.dirty.get() || self.cached.borrow().is_none() {
            let inputs: Map<String, Value> = {
                let data = self.data.borrow();
                self.cursors
                    .iter()
                    .filter_map(|(key, path)| read(&data, path).map(|v| (key.clone(), v.clone())))
                    .collect()
            };
            let value = (self.project)(&inputs);
            *self.cached.borrow_mut() = Some(value);
            self.dirty.set(false);
            self.computations.set(self.computations.get() + 1);
        }
        self.cached.borrow().clone()
    }

    fn dependencies(&self) -> Vec<Path> {
        self.cursors.iter().map(|(_, path)| path.clone()).collect()
    }
}

/// An observable JSON document.
pub struct MemoryTree {
    data: Rc<RefCell<Value>>,
    options: TreeOptions,
    listeners: ListenerSet,
    facets: RefCell<BTreeMap<String, Rc<MemoryFacet>>>,
    pending: RefCell<ChangeSet>,
    batch_depth: Cell<usize>,
}

impl MemoryTree {
    /// Create a synchronous tree over `data`.
    #[must_use]
    pub fn new(data: Value) -> Rc<Self> {
        Self::with_options(data, TreeOptions::default())
    }

    #[must_use]
    pub fn with_options(data: Value, options: TreeOptions) -> Rc<Self> {
        Rc::new(Self {
            data: Rc::new(RefCell::new(data)),
            options,
            listeners: ListenerSet::new(),
            facets: RefCell::new(BTreeMap::new()),
            pending: RefCell::new(ChangeSet::new()),
            batch_depth: Cell::new(0),
        })
    }

    /// Builder-style facet registration.
    #[must_use]
    pub fn with_facet(self: Rc<Self>, descriptor: FacetDescriptor) -> Rc<Self> {
        self.register_facet(descriptor);
        self
    }

    /// Register (or replace) a facet.
    pub fn register_facet(&self, descriptor: FacetDescriptor) {
        let FacetDescriptor {
            name,
            cursors,
            project,
        } = descriptor;
        let facet = Rc::new(MemoryFacet {
            name: name.clone(),
            cursors,
            project,
            data: Rc::clone(&self.data),
            cached: RefCell::new(None),
            dirty: Cell::new(true),
            computations: Cell::new(0),
        });
        self.facets.borrow_mut().insert(name, facet);
    }

    /// This tree as a shared handle.
    #[must_use]
    pub fn handle(self: &Rc<Self>) -> TreeHandle {
        Rc::clone(self) as TreeHandle
    }

    /// Select a cursor at `path`.
    pub fn select(self: &Rc<Self>, path: impl Into<Path>) -> Result<Cursor, TreeError> {
        tree::select(&self.handle(), path)
    }

    /// Read the value at `path`.
    #[must_use]
    pub fn read(&self, path: impl Into<Path>) -> Option<Value> {
        Tree::get(self, &path.into())
    }

    /// Write `value` at `path`, creating missing intermediate objects.
    pub fn write(&self, path: impl Into<Path>, value: impl Into<Value>) -> Result<(), TreeError> {
        Tree::set(self, &path.into(), value.into())
    }

    /// Remove the value at `path`. Removing something absent is a no-op
    /// that still records the path as changed. Removing an array element
    /// records the array itself.
    pub fn unset(&self, path: impl Into<Path>) -> Result<(), TreeError> {
        let path = path.into();
        let shifted = {
            let mut data = self.data.borrow_mut();
            match path.segments().split_last() {
                None => {
                    *data = Value::Null;
                    false
                }
                Some((last, init)) => match (read_mut(&mut *data, init), last) {
                    (Some(Value::Object(map)), PathSegment::Key(k)) => {
                        map.remove(k);
                        false
                    }
                    (Some(Value::Array(items)), PathSegment::Index(i)) if *i < items.len() => {
                        items.remove(*i);
                        true
                    }
                    _ => false,
                },
            }
        };
        let changed = match path.parent() {
            Some(parent) if shifted => parent,
            _ => path,
        };
        self.record(changed);
        Ok(())
    }

    /// Open a batch: writes made while any batch guard is alive are emitted
    /// as one [`ChangeSet`] when the outermost guard drops.
    #[must_use = "the batch is flushed when the guard drops"]
    pub fn batch(self: &Rc<Self>) -> TreeBatch {
        self.batch_depth.set(self.batch_depth.get() + 1);
        TreeBatch {
            tree: Rc::clone(self),
        }
    }

    /// Deliver queued changes as one batch. Returns whether anything was
    /// delivered.
    pub fn flush(&self) -> bool {
        let changes = std::mem::take(&mut *self.pending.borrow_mut());
        if changes.is_empty() {
            return false;
        }
        tracing::trace!(paths = changes.len(), "memory tree flush");
        self.listeners.emit(&changes);
        true
    }

    /// Whether changes are waiting for [`flush`](Self::flush).
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.borrow().is_empty()
    }

    /// Number of registered change listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// How many times the named facet has recomputed its value.
    #[must_use]
    pub fn facet_computations(&self, name: &str) -> Option<u64> {
        self.facets
            .borrow()
            .get(name)
            .map(|facet| facet.computations.get())
    }

    #[must_use]
    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    fn record(&self, path: Path) {
        for facet in self.facets.borrow().values() {
            facet.invalidate_if_related(&path);
        }
        self.pending.borrow_mut().push(path);
        if !self.options.asynchronous && self.batch_depth.get() == 0 {
            self.flush();
        }
    }
}

impl Tree for MemoryTree {
    fn get(&self, path: &Path) -> Option<Value> {
        read(&self.data.borrow(), path).cloned()
    }

    fn check_path(&self, path: &Path) -> Result<(), TreeError> {
        let data = self.data.borrow();
        let mut node = Some(&*data);
        for (depth, segment) in path.segments().iter().enumerate() {
            let Some(current) = node else { break };
            node = match (current, segment) {
                (Value::Object(map), PathSegment::Key(k)) => map.get(k),
                (Value::Array(items), PathSegment::Index(i)) => items.get(*i),
                (Value::Null, _) => None,
                (other, _) => {
                    return Err(TreeError::Unselectable {
                        path: path.clone(),
                        reason: format!(
                            "segment {} steps into {}",
                            depth + 1,
                            kind_of(other)
                        ),
                    });
                }
            };
        }
        Ok(())
    }

    fn set(&self, path: &Path, value: Value) -> Result<(), TreeError> {
        {
            let mut data = self.data.borrow_mut();
            write(&mut data, path, value)?;
        }
        self.record(path.clone());
        Ok(())
    }

    fn facet(&self, name: &str) -> Option<FacetHandle> {
        self.facets
            .borrow()
            .get(name)
            .map(|facet| Rc::clone(facet) as FacetHandle)
    }

    fn watch(&self, listener: Listener) -> Subscription {
        self.listeners.add(listener)
    }
}

impl fmt::Debug for MemoryTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTree")
            .field("data", &self.data.borrow())
            .field("options", &self.options)
            .field("facets", &self.facets.borrow().keys().collect::<Vec<_>>())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Guard returned by [`MemoryTree::batch`].
pub struct TreeBatch {
    tree: Rc<MemoryTree>,
}

impl Drop for TreeBatch {
    fn drop(&mut self) {
        let depth = self.tree.batch_depth.get().saturating_sub(1);
        self.tree.batch_depth.set(depth);
        if depth == 0 && !self.tree.options.asynchronous {
            self.tree.flush();
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn read<'a>(data: &'a Value, path: &Path) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(data, |node, segment| match (node, segment) {
            (Value::Object(map), PathSegment::Key(k)) => map.get(k),
            (Value::Array(items), PathSegment::Index(i)) => items.get(*i),
            _ => None,
        })
}

fn read_mut<'a>(data: &'a mut Value, segments: &[PathSegment]) -> Option<&'a mut Value> {
    segments
        .iter()
        .try_fold(data, |node, segment| match (node, segment) {
            (Value::Object(map), PathSegment::Key(k)) => map.get_mut(k),
            (Value::Array(items), PathSegment::Index(i)) => items.get_mut(*i),
            _ => None,
        })
}

fn write(data: &mut Value, path: &Path, value: Value) -> Result<(), TreeError> {
    let Some((last, init)) = path.segments().split_last() else {
        *data = value;
        return Ok(());
    };

    let mut node = data;
    for segment in init {
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        node = match (node, segment) {
            (Value::Object(map), PathSegment::Key(k)) => {
                map.entry(k.clone()).or_insert(Value::Null)
            }
            (Value::Array(items), PathSegment::Index(i)) => match items.get_mut(*i) {
                Some(item) => item,
                None => {
                    return Err(TreeError::Unselectable {
                        path: path.clone(),
                        reason: format!("index {i} is out of range"),
                    });
                }
            },
            (other, _) => {
                return Err(TreeError::Unselectable {
                    path: path.clone(),
                    reason: format!("cannot write through {}", kind_of(other)),
                });
            }
        };
    }

    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    match (node, last) {
        (Value::Object(map), PathSegment::Key(k)) => {
            map.insert(k.clone(), value);
            Ok(())
        }
        (Value::Array(items), PathSegment::Index(i)) => {
            if let Some(item) = items.get_mut(*i) {
                *item = value;
                Ok(())
            } else if *i == items.len() {
                items.push(value);
                Ok(())
            } else {
                Err(TreeError::Unselectable {
                    path: path.clone(),
                    reason: format!("index {i} is past the end of {} items", items.len()),
                })
            }
        }
        (other, _) => Err(TreeError::Unselectable {
            path: path.clone(),
            reason: format!("cannot write into {}", kind_of(other)),
        }),
    }
}
