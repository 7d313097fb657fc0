#![forbid(unsafe_code)]

//! The host-framework surface the binding core talks to.
//!
//! The component framework is external. From it the core needs the input
//! properties of a component ([`Props`]) and a way to push state into the
//! component's state container ([`StateSink`]). Lifecycle events arrive as
//! calls on [`Branch`](crate::branch::Branch).

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{BindError, Result};
use crate::path::Path;
use crate::tree::{Cursor, TreeHandle};

/// A single input property.
#[derive(Clone)]
pub enum Prop {
    Value(Value),
    Tree(TreeHandle),
    Cursor(Cursor),
}

impl Prop {
    /// Short description of what this property holds, used in error messages.
    #[must_use]
    pub fn kind(&self) -> String {
        match self {
            Self::Value(Value::Null) => "null".into(),
            Self::Value(Value::Bool(_)) => "a boolean".into(),
            Self::Value(Value::Number(_)) => "a number".into(),
            Self::Value(Value::String(_)) => "a string".into(),
            Self::Value(Value::Array(_)) => "an array".into(),
            Self::Value(Value::Object(_)) => "a plain object".into(),
            Self::Tree(_) => "a tree".into(),
            Self::Cursor(_) => "a cursor".into(),
        }
    }
}

impl PartialEq for Prop {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Tree(a), Self::Tree(b)) => Rc::ptr_eq(a, b),
            (Self::Cursor(a), Self::Cursor(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Tree(_) => f.write_str("Tree(..)"),
            Self::Cursor(c) => f.debug_tuple("Cursor").field(c).finish(),
        }
    }
}

impl From<Value> for Prop {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<TreeHandle> for Prop {
    fn from(tree: TreeHandle) -> Self {
        Self::Tree(tree)
    }
}

impl From<Cursor> for Prop {
    fn from(cursor: Cursor) -> Self {
        Self::Cursor(cursor)
    }
}

/// Input properties of a component instance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Props {
    entries: BTreeMap<String, Prop>,
}

impl Props {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, prop: impl Into<Prop>) -> Self {
        self.insert(key, prop);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, prop: impl Into<Prop>) {
        self.entries.insert(key.into(), prop.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Prop> {
        self.entries.get(key)
    }

    /// The plain value under `key`, if it is one.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.entries.get(key)? {
            Prop::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Interpret the property under `key` as a path.
    ///
    /// Fails with a resolution error naming `key` when the property is
    /// missing or not path-shaped.
    pub fn path(&self, key: &str) -> Result<Path> {
        let value = self
            .value(key)
            .ok_or_else(|| BindError::resolution(key, format!("property `{key}` is not set")))?;
        Path::from_value(value).map_err(|err| BindError::resolution(key, err))
    }

    /// The cursor under `key`, if it is one.
    #[must_use]
    pub fn cursor(&self, key: &str) -> Option<&Cursor> {
        match self.entries.get(key)? {
            Prop::Cursor(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Values a component instance currently observes, by local key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    values: BTreeMap<String, Value>,
}

impl Snapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The value under `key` as a string slice, if it is a string.
    #[must_use]
    pub fn str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Apply `patch`: `Some` entries set a key, `None` entries clear it.
    pub fn apply(&mut self, patch: &StatePatch) {
        for (key, value) in patch.iter() {
            match value {
                Some(v) => {
                    self.values.insert(key.to_owned(), v.clone());
                }
                None => {
                    self.values.remove(key);
                }
            }
        }
    }
}

/// A set of key updates delivered to a component in one state change.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatePatch {
    changes: BTreeMap<String, Option<Value>>,
}

impl StatePatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Option<Value>) {
        self.changes.insert(key.into(), value);
    }

    /// `Some(Some(v))`: the key is set to `v`. `Some(None)`: the key is
    /// cleared. `None`: the patch does not touch the key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Option<&Value>> {
        self.changes.get(key).map(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// The host's state-patch-apply primitive.
///
/// Implementations merge the patch into the component's state container and
/// schedule a re-render.
pub trait StateSink {
    fn apply(&self, patch: StatePatch);
}

impl<F: Fn(StatePatch)> StateSink for F {
    fn apply(&self, patch: StatePatch) {
        self(patch);
    }
}
