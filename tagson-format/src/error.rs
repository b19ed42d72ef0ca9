//! Error types for Tagson

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Shape of a computation: completed in place or deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Completed synchronously
    Sync,
    /// Produced at least one deferred value
    Async,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Sync => f.write_str("Sync"),
            Shape::Async => f.write_str("Async"),
        }
    }
}

/// Tagson error types
///
/// Errors are `Clone` so they can be carried through shared deferred values.
#[derive(Debug, Clone, Error)]
pub enum TagsonError {
    /// Attempted to register the back-reference marker or a JSON kind name.
    #[error("Reserved type name: '{0}' cannot be registered")]
    ReservedTypeName(String),
    /// Type map names a type without a registered reviver.
    #[error("Unregistered type: {0}")]
    UnregisteredType(String),
    /// Type map side channel is malformed.
    #[error("Invalid type map: {0}")]
    InvalidTypeMap(String),
    /// Value has no plain representation and no registered type claims it.
    #[error("Cannot represent {kind} at keypath '{keypath}' without a matching type")]
    Unrepresentable {
        /// Keypath of the offending node
        keypath: String,
        /// Human readable kind of the offending value
        kind: String,
    },
    /// Cyclic input reached while cycle handling is disabled.
    #[error("Cyclic reference at keypath '{keypath}' while cycle handling is disabled")]
    CycleDetected {
        /// Keypath at which the cycle closed
        keypath: String,
    },
    /// Requested sync/async shape differs from the one actually produced.
    #[error("{expected} method requested but {found} result obtained at keypath '{keypath}'")]
    ModeMismatch {
        /// Shape the caller asked for
        expected: Shape,
        /// Shape the walk produced
        found: Shape,
        /// Keypath where the mismatch was detected
        keypath: String,
    },
    /// Error raised by caller-supplied test/replace/revive code.
    #[error("{0}")]
    Custom(String),
    /// Error annotated with the node and type being processed.
    #[error("At keypath '{keypath}'{}: {source}", type_suffix(.type_name))]
    AtKeypath {
        /// Keypath being processed
        keypath: String,
        /// Type being applied, if any
        type_name: Option<String>,
        /// Underlying error
        source: Box<TagsonError>,
    },
    /// Deferred value was rejected.
    #[error("Deferred value rejected: {0}")]
    Rejected(String),
    /// Resolver was dropped before settling its deferred value.
    #[error("Deferred value abandoned before it settled")]
    ResolverDropped,
    /// A configured limit was exceeded.
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),
    /// Options failed validation.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    /// JSON parsing or serialization failed.
    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

fn type_suffix(type_name: &Option<String>) -> String {
    match type_name {
        Some(name) => format!(" (type '{}')", name),
        None => String::new(),
    }
}

impl TagsonError {
    /// Build an error from caller code
    pub fn custom(message: impl Into<String>) -> Self {
        TagsonError::Custom(message.into())
    }

    /// Attach keypath/type context unless already attached
    pub fn at(self, keypath: &str, type_name: Option<&str>) -> Self {
        match self {
            already @ TagsonError::AtKeypath { .. } => already,
            // These already name their keypath
            e @ (TagsonError::ModeMismatch { .. }
            | TagsonError::Unrepresentable { .. }
            | TagsonError::CycleDetected { .. }) => e,
            other => TagsonError::AtKeypath {
                keypath: keypath.to_string(),
                type_name: type_name.map(str::to_string),
                source: Box::new(other),
            },
        }
    }

    /// Innermost error, skipping keypath annotations
    pub fn root_cause(&self) -> &TagsonError {
        match self {
            TagsonError::AtKeypath { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// True for sync/async mode mismatches
    pub fn is_mode_mismatch(&self) -> bool {
        matches!(self.root_cause(), TagsonError::ModeMismatch { .. })
    }

    /// True for configuration errors (reserved or unknown type names)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.root_cause(),
            TagsonError::ReservedTypeName(_)
                | TagsonError::UnregisteredType(_)
                | TagsonError::InvalidTypeMap(_)
                | TagsonError::InvalidOptions(_)
        )
    }
}

impl From<serde_json::Error> for TagsonError {
    fn from(err: serde_json::Error) -> Self {
        TagsonError::Json(Arc::new(err))
    }
}

impl From<std::io::Error> for TagsonError {
    fn from(err: std::io::Error) -> Self {
        TagsonError::Io(Arc::new(err))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TagsonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_wraps_once() {
        let err = TagsonError::custom("boom").at("a.b", Some("date"));
        let again = err.clone().at("a", None);
        match again {
            TagsonError::AtKeypath {
                keypath, type_name, ..
            } => {
                assert_eq!(keypath, "a.b");
                assert_eq!(type_name.as_deref(), Some("date"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "At keypath 'a.b' (type 'date'): boom"
        );
    }

    #[test]
    fn mode_mismatch_keeps_its_own_keypath() {
        let err = TagsonError::ModeMismatch {
            expected: Shape::Sync,
            found: Shape::Async,
            keypath: "x".to_string(),
        }
        .at("y", None);
        assert!(err.is_mode_mismatch());
        assert_eq!(
            err.to_string(),
            "Sync method requested but Async result obtained at keypath 'x'"
        );
    }

    #[test]
    fn root_cause_skips_annotations() {
        let err = TagsonError::UnregisteredType("set".into()).at("", None);
        assert!(err.is_configuration());
        assert!(matches!(err.root_cause(), TagsonError::UnregisteredType(_)));
    }
}
