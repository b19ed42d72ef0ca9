//! Walk instrumentation

use crate::options::CyclicMode;
use std::sync::Arc;
use tagson_format::Value;

/// Callback receiving walk events
///
/// Observers only see events; they cannot change the produced tree.
pub type Observer = Arc<dyn Fn(&ObserverEvent<'_>) + Send + Sync>;

/// What happened at a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A value written as is
    Primitive,
    /// Entering a container
    Enter,
    /// A registered type claimed the value
    TypeDetected {
        /// Name of the claiming type
        type_name: String,
    },
    /// The claiming type's replacer is about to run
    Replacing {
        /// Name of the claiming type
        type_name: String,
    },
    /// The node repeats an earlier one
    Cyclic {
        /// Keypath of the first occurrence
        target: String,
    },
    /// The branch waits on a deferred value
    AwaitingDeferred,
    /// A deferred branch settled and is being encapsulated
    ResolvingDeferred,
    /// Leaving a container
    Leave,
}

/// Event record passed to an [`Observer`]
#[derive(Debug)]
pub struct ObserverEvent<'a> {
    /// Keypath of the node
    pub keypath: &'a str,
    /// Value at the node
    pub value: &'a Value,
    /// Cycle handling in effect
    pub cyclic: CyclicMode,
    /// Whether the value is the output of a replacement
    pub replaced: bool,
    /// What happened
    pub kind: EventKind,
}
