#![forbid(unsafe_code)]

//! Declarative binding specs.
//!
//! A component declares which local state keys map to which tree locations
//! through a [`BindingSpec`]: a cursors declaration and a facets declaration.
//! Each is a [`Declaration`], either a fixed map or a function of the
//! component's [`Props`]. Both shapes go through
//! [`Declaration::evaluate`] so the resolver only ever sees plain maps.
//!
//! ```ignore
//! let spec = BindingSpec::new()
//!     .cursors_fn(|props| {
//!         Ok(CursorMap::new()
//!             .bind("name", props.path("arg")?)
//!             .bind("surname", ["surname"]))
//!     })
//!     .facets(FacetMap::new().bind("greeting", "greeting"));
//! ```

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::host::Props;
use crate::path::Path;
use crate::tree::Cursor;

/// Where a cursor binding points.
#[derive(Clone, Debug, PartialEq)]
pub enum CursorSource {
    /// Select this path on the ambient tree at resolve time.
    Path(Path),
    /// Use a cursor the component already holds. It keeps reading the tree
    /// it was selected from, which need not be the ambient one.
    Cursor(Cursor),
}

impl From<Path> for CursorSource {
    fn from(path: Path) -> Self {
        Self::Path(path)
    }
}

impl From<&str> for CursorSource {
    fn from(key: &str) -> Self {
        Self::Path(Path::from(key))
    }
}

impl<const N: usize> From<[&str; N]> for CursorSource {
    fn from(keys: [&str; N]) -> Self {
        Self::Path(Path::from(keys))
    }
}

impl From<Cursor> for CursorSource {
    fn from(cursor: Cursor) -> Self {
        Self::Cursor(cursor)
    }
}

/// Local key → cursor source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CursorMap(BTreeMap<String, CursorSource>);

impl CursorMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bind(mut self, key: impl Into<String>, source: impl Into<CursorSource>) -> Self {
        self.0.insert(key.into(), source.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CursorSource> {
        self.0.get(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, CursorSource> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Local key → facet name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FacetMap(BTreeMap<String, String>);

impl FacetMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bind(mut self, key: impl Into<String>, facet: impl Into<String>) -> Self {
        self.0.insert(key.into(), facet.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

type DeclarationFn<M> = Rc<dyn Fn(&Props) -> Result<M>>;

/// A map declared either up front or as a function of props.
pub enum Declaration<M> {
    Static(M),
    Dynamic(DeclarationFn<M>),
}

impl<M: Clone> Declaration<M> {
    pub fn dynamic(f: impl Fn(&Props) -> Result<M> + 'static) -> Self {
        Self::Dynamic(Rc::new(f))
    }

    /// Produce the plain map for the given props.
    pub fn evaluate(&self, props: &Props) -> Result<M> {
        match self {
            Self::Static(map) => Ok(map.clone()),
            Self::Dynamic(f) => f(props),
        }
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }
}

impl<M: Default> Default for Declaration<M> {
    fn default() -> Self {
        Self::Static(M::default())
    }
}

impl<M: Clone> Clone for Declaration<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Static(map) => Self::Static(map.clone()),
            Self::Dynamic(f) => Self::Dynamic(Rc::clone(f)),
        }
    }
}

impl<M: fmt::Debug> fmt::Debug for Declaration<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(map) => f.debug_tuple("Static").field(map).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Everything a component declares about its bindings.
#[derive(Clone, Debug, Default)]
pub struct BindingSpec {
    pub cursors: Declaration<CursorMap>,
    pub facets: Declaration<FacetMap>,
}

impl BindingSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cursors(mut self, map: CursorMap) -> Self {
        self.cursors = Declaration::Static(map);
        self
    }

    #[must_use]
    pub fn cursors_fn(mut self, f: impl Fn(&Props) -> Result<CursorMap> + 'static) -> Self {
        self.cursors = Declaration::dynamic(f);
        self
    }

    #[must_use]
    pub fn facets(mut self, map: FacetMap) -> Self {
        self.facets = Declaration::Static(map);
        self
    }

    #[must_use]
    pub fn facets_fn(mut self, f: impl Fn(&Props) -> Result<FacetMap> + 'static) -> Self {
        self.facets = Declaration::dynamic(f);
        self
    }

    /// Whether resolution depends on props.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.cursors.is_dynamic() || self.facets.is_dynamic()
    }
}
