//! Walk options

use crate::observer::Observer;
use serde::Deserialize;
use std::fmt;
use tagson_format::{Limits, Result, Shape};

/// Which shape of result the caller accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Result must be produced in place
    #[default]
    Sync,
    /// Result must involve at least one deferred value
    Async,
    /// Either shape is accepted
    Auto,
}

impl SyncMode {
    /// Shape demanded by this mode, if any
    pub fn required(&self) -> Option<Shape> {
        match self {
            SyncMode::Sync => Some(Shape::Sync),
            SyncMode::Async => Some(Shape::Async),
            SyncMode::Auto => None,
        }
    }
}

/// Cycle handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclicMode {
    /// Record first visits and emit back-references for repeats
    #[default]
    Enabled,
    /// Emit back-references for known nodes without recording new ones
    #[serde(rename = "readonly")]
    ReadOnly,
    /// No back-references; a cycle is an error
    Disabled,
}

impl CyclicMode {
    /// Mode used for a replacement result
    pub(crate) fn for_replacement(self) -> Self {
        match self {
            CyclicMode::Disabled => CyclicMode::Disabled,
            _ => CyclicMode::ReadOnly,
        }
    }

    /// Mode used for the children of a node
    pub(crate) fn for_children(self) -> Self {
        match self {
            CyclicMode::Disabled => CyclicMode::Disabled,
            _ => CyclicMode::Enabled,
        }
    }
}

/// Options for encapsulation
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct EncapsulateOptions {
    /// Accepted result shape
    pub mode: SyncMode,
    /// Cycle handling
    pub cyclic: CyclicMode,
    /// Walk limits
    pub limits: Limits,
    /// Instrumentation callback
    #[serde(skip)]
    pub observer: Option<Observer>,
}

impl EncapsulateOptions {
    /// Options with the given mode
    pub fn with_mode(mode: SyncMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Check the limits
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()
    }
}

impl fmt::Debug for EncapsulateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncapsulateOptions")
            .field("mode", &self.mode)
            .field("cyclic", &self.cyclic)
            .field("limits", &self.limits)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Options for revival
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReviveOptions {
    /// Accepted result shape
    pub mode: SyncMode,
    /// Walk limits
    pub limits: Limits,
}

impl ReviveOptions {
    /// Options with the given mode
    pub fn with_mode(mode: SyncMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Check the limits
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()
    }
}
