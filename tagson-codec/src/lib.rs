//! Tagson Codec - Type registry, encapsulation and revival
//!
//! This crate turns value graphs into plain JSON trees and back:
//!
//! - An ordered, user-extensible type registry
//! - The encapsulation engine (cycles, registered types, deferred branches)
//! - The revival engine (back-references, type chains, deferred revivers)
//! - Sync, async and auto modes over the same registry
//!
//! # Example
//!
//! ```rust,ignore
//! use tagson_codec::{Tagson, TypeSpec};
//! use tagson_format::Value;
//!
//! let mut tagson = Tagson::new();
//! tagson.register((
//!     "Infinity",
//!     TypeSpec::new(|v, _| v.as_f64() == Some(f64::INFINITY))
//!         .replace(|_, _| Ok(Value::from("Infinity")))
//!         .revive(|_, _| Ok(Value::Number(f64::INFINITY))),
//! ))?;
//!
//! let json = tagson.encapsulate(&Value::array([f64::INFINITY]), None)?;
//! let back = tagson.revive(&json, None)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
mod encapsulate;
pub mod observer;
pub mod options;
pub mod outcome;
pub mod registry;
mod revive;
pub mod type_map;

// Re-export commonly used types
pub use context::{IterateIn, NodeFlags, State};
pub use observer::{EventKind, Observer, ObserverEvent};
pub use options::{CyclicMode, EncapsulateOptions, ReviveOptions, SyncMode};
pub use outcome::Outcome;
pub use registry::{Registration, RegisteredType, TypeRegistry, TypeSet, TypeSpec};
pub use tagson_format::{Deferred, Limits, Result, Shape, TagsonError, Value};
pub use type_map::{TypeMap, TypeTag};

use encapsulate::Encapsulator;
use futures::future::{FutureExt, LocalBoxFuture};
use revive::Reviver;
use serde_json::{Map, Value as Json};
use std::sync::Arc;
use tagson_format::classify::kind_of;

/// Caller state passed to test, replace and revive functions
pub type UserState = Map<String, Json>;

/// Registry plus default options
///
/// Cloning is cheap; clones share the registry until one of them registers
/// more types.
#[derive(Debug, Clone, Default)]
pub struct Tagson {
    registry: Arc<TypeRegistry>,
    encapsulate_options: EncapsulateOptions,
    revive_options: ReviveOptions,
}

impl Tagson {
    /// Instance with an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance with default options for every call
    ///
    /// The mode of the defaults is ignored by the mode-specific methods.
    pub fn with_options(
        encapsulate_options: EncapsulateOptions,
        revive_options: ReviveOptions,
    ) -> Result<Self> {
        encapsulate_options.validate()?;
        revive_options.validate()?;
        Ok(Self {
            registry: Arc::new(TypeRegistry::new()),
            encapsulate_options,
            revive_options,
        })
    }

    /// Register types as primary entries
    pub fn register(&mut self, types: impl Into<Registration>) -> Result<&mut Self> {
        Arc::make_mut(&mut self.registry).register(types)?;
        Ok(self)
    }

    /// Register types as fallback entries
    pub fn register_fallback(&mut self, types: impl Into<Registration>) -> Result<&mut Self> {
        Arc::make_mut(&mut self.registry).register_fallback(types)?;
        Ok(self)
    }

    /// The registry
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Default encapsulation options
    pub fn encapsulate_options(&self) -> &EncapsulateOptions {
        &self.encapsulate_options
    }

    /// Default revival options
    pub fn revive_options(&self) -> &ReviveOptions {
        &self.revive_options
    }

    /// Encapsulate synchronously
    ///
    /// # Errors
    ///
    /// Fails with a mode mismatch if any branch turns out to be deferred
    pub fn encapsulate(&self, value: &Value, user: Option<UserState>) -> Result<Json> {
        let options = self.encapsulate_defaults(SyncMode::Sync);
        match self.encapsulate_with(value, state_from(user), &options)? {
            Outcome::Ready(json) => Ok(json),
            Outcome::Pending(_) => Err(mismatch(Shape::Sync, Shape::Async)),
        }
    }

    /// Encapsulate a graph containing deferred values
    ///
    /// The future fails with a mode mismatch if nothing was deferred.
    pub fn encapsulate_async(
        &self,
        value: &Value,
        user: Option<UserState>,
    ) -> LocalBoxFuture<'static, Result<Json>> {
        let options = self.encapsulate_defaults(SyncMode::Async);
        match self.encapsulate_with(value, state_from(user), &options) {
            Ok(outcome) => outcome.into_future(),
            Err(err) => futures::future::ready(Err(err)).boxed_local(),
        }
    }

    /// Encapsulate with explicit options
    pub fn encapsulate_with(
        &self,
        value: &Value,
        state: State,
        options: &EncapsulateOptions,
    ) -> Result<Outcome<Json>> {
        tracing::debug!(mode = ?options.mode, cyclic = ?options.cyclic, "encapsulate");
        Encapsulator::new(self.registry.clone(), options)?.run(value, state)
    }

    /// Revive synchronously
    pub fn revive(&self, json: &Json, user: Option<UserState>) -> Result<Value> {
        let options = self.revive_defaults(SyncMode::Sync);
        match self.revive_with(json, state_from(user), &options)? {
            Outcome::Ready(value) => Ok(value),
            Outcome::Pending(_) => Err(mismatch(Shape::Sync, Shape::Async)),
        }
    }

    /// Revive with asynchronous revivers
    ///
    /// The result rejects with a mode mismatch if every reviver completed in
    /// place.
    pub fn revive_async(&self, json: &Json, user: Option<UserState>) -> Deferred {
        let options = self.revive_defaults(SyncMode::Async);
        match self.revive_with(json, state_from(user), &options) {
            Ok(Outcome::Ready(value)) => Deferred::resolve(value),
            Ok(Outcome::Pending(fut)) => Deferred::from_future(fut),
            Err(err) => Deferred::reject(err),
        }
    }

    /// Revive with explicit options
    pub fn revive_with(
        &self,
        json: &Json,
        state: State,
        options: &ReviveOptions,
    ) -> Result<Outcome<Value>> {
        tracing::debug!(mode = ?options.mode, "revive");
        Reviver::new(self.registry.clone(), options)?.run(json, state)
    }

    /// Distinct names of the types detected in `value`
    ///
    /// Deferred branches are not followed.
    pub fn special_type_names(&self, value: &Value) -> Result<Vec<String>> {
        let options = self.encapsulate_defaults(SyncMode::Auto);
        let types = Encapsulator::new(self.registry.clone(), &options)?
            .detect_types(value, State::default())?;
        Ok(types.type_names())
    }

    /// Name of the type claiming the root, or its JSON kind
    ///
    /// Only the root is inspected; for a chain the outermost type, the one
    /// that claimed the value itself, is reported.
    pub fn root_type_name(&self, value: &Value) -> Result<String> {
        let options = self.encapsulate_defaults(SyncMode::Auto);
        let types = Encapsulator::new(self.registry.clone(), &options)?
            .iterate_none()
            .detect_types(value, State::default())?;
        let name = types
            .get("")
            .and_then(|tag| tag.names().last().cloned())
            .unwrap_or_else(|| kind_of(value).as_str().to_string());
        Ok(name)
    }

    fn encapsulate_defaults(&self, mode: SyncMode) -> EncapsulateOptions {
        EncapsulateOptions {
            mode,
            ..self.encapsulate_options.clone()
        }
    }

    fn revive_defaults(&self, mode: SyncMode) -> ReviveOptions {
        ReviveOptions {
            mode,
            ..self.revive_options.clone()
        }
    }
}

fn state_from(user: Option<UserState>) -> State {
    State::with_user(user.unwrap_or_default())
}

fn mismatch(expected: Shape, found: Shape) -> TagsonError {
    TagsonError::ModeMismatch {
        expected,
        found,
        keypath: String::new(),
    }
}
