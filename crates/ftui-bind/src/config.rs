#![forbid(unsafe_code)]

//! Per-instance binding configuration.

/// Options for one bound component instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindConfig {
    /// Deliver a patch for a batch that touched bound paths even when every
    /// recomputed value equals the previous one. Defaults to `true`.
    pub deliver_unchanged: bool,
    /// Label attached to log events for this instance.
    pub name: Option<String>,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            deliver_unchanged: true,
            name: None,
        }
    }
}

impl BindConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_deliver_unchanged(mut self, deliver: bool) -> Self {
        self.deliver_unchanged = deliver;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub(crate) fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
}
