#![forbid(unsafe_code)]

//! Error types for binding resolution and lifecycle wiring.
//!
//! Every variant describes a programmer error in how a component is wired to
//! the tree. Nothing here is retried: errors surface at the mount, update, or
//! root call that caused them.

use thiserror::Error;

use crate::tree::TreeError;

pub type Result<T> = std::result::Result<T, BindError>;

#[derive(Debug, Error)]
pub enum BindError {
    /// A root was given something other than a tree handle.
    #[error("root expects a tree handle in its `tree` property, found {found}")]
    InvalidTreeHandle { found: String },

    /// A branch was mounted outside of any root's subtree.
    #[error("no tree in context: branch must be mounted below a root")]
    MissingTreeContext,

    /// A binding declaration could not be turned into a live source.
    #[error("cannot resolve binding `{key}`: {reason}")]
    Resolution { key: String, reason: String },

    /// A lifecycle event arrived in a phase that does not accept it.
    #[error("lifecycle event `{event}` is not valid in phase {phase}")]
    Lifecycle { phase: String, event: &'static str },
}

impl BindError {
    #[must_use]
    pub fn resolution(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Resolution {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_handle(found: impl Into<String>) -> Self {
        Self::InvalidTreeHandle {
            found: found.into(),
        }
    }

    /// Whether this error came out of binding resolution.
    #[must_use]
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution { .. })
    }
}

impl From<TreeError> for BindError {
    fn from(err: TreeError) -> Self {
        let key = match &err {
            TreeError::Unselectable { path, .. } => path.to_string(),
            TreeError::InvalidPath { .. } => String::from("<path>"),
        };
        Self::resolution(key, err)
    }
}
