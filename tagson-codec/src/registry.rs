//! Type registry
//!
//! Registered types are kept in two ordered sequences, primary and fallback.
//! Dispatch scans primary entries from the most recently registered to the
//! oldest, then fallback entries the same way, so a later and more specific
//! registration overrides an earlier general one and a fallback never shadows
//! a primary match.
//!
//! # Example
//!
//! ```rust,ignore
//! use tagson_codec::{TypeRegistry, TypeSet, TypeSpec};
//!
//! let mut registry = TypeRegistry::new();
//! registry.register(TypeSet::new().with(
//!     "nan",
//!     TypeSpec::new(|v, _| v.as_f64().map_or(false, f64::is_nan))
//!         .replace(|_, _| Ok(Value::from("NaN")))
//!         .revive(|_, _| Ok(Value::Number(f64::NAN))),
//! ))?;
//! ```

use crate::context::{IterateIn, State};
use std::fmt;
use std::sync::Arc;
use tagson_format::classify::{is_reserved_type_name, same_constructor};
use tagson_format::{Class, ObjectRef, Result, TagsonError, Value};

/// Predicate deciding whether a type claims a value
pub type TestFn = Arc<dyn Fn(&Value, &mut State) -> bool + Send + Sync>;
/// Converts a value into its encapsulated representation
pub type ReplaceFn = Arc<dyn Fn(&Value, &mut State) -> Result<Value> + Send + Sync>;
/// Rebuilds a value from its revived representation
pub type ReviveFn = Arc<dyn Fn(Value, &mut State) -> Result<Value> + Send + Sync>;

/// Specification of one type
///
/// `replace_async`/`revive_async` are expected to return [`Value::Deferred`];
/// a plain `replace`/`revive` may too, which makes the walk asynchronous.
#[derive(Clone, Default)]
pub struct TypeSpec {
    test: Option<TestFn>,
    replace: Option<ReplaceFn>,
    replace_async: Option<ReplaceFn>,
    revive: Option<ReviveFn>,
    revive_async: Option<ReviveFn>,
    test_plain_objects: bool,
    iterate_in: Option<IterateIn>,
    iterate_unset_numeric: bool,
}

impl TypeSpec {
    /// Spec with only a test
    pub fn new<T>(test: T) -> Self
    where
        T: Fn(&Value, &mut State) -> bool + Send + Sync + 'static,
    {
        Self {
            test: Some(Arc::new(test)),
            ..Self::default()
        }
    }

    /// The `[test, replace, revive]` form
    pub fn from_parts<T, R, V>(test: T, replace: R, revive: V) -> Self
    where
        T: Fn(&Value, &mut State) -> bool + Send + Sync + 'static,
        R: Fn(&Value, &mut State) -> Result<Value> + Send + Sync + 'static,
        V: Fn(Value, &mut State) -> Result<Value> + Send + Sync + 'static,
    {
        Self::new(test).replace(replace).revive(revive)
    }

    /// Spec for instances of a class
    ///
    /// Instances are matched by [`same_constructor`], encoded as a plain copy
    /// of their properties and revived as a new instance of the class.
    pub fn class(class: Class) -> Self {
        let class = Arc::new(class);
        let test_class = class.clone();
        Self::new(move |value, _| same_constructor(value, &test_class))
            .replace(|value, _| {
                let copy = ObjectRef::new();
                if let Value::Object(obj) = value {
                    for (k, v) in obj.entries() {
                        copy.insert(k, v);
                    }
                }
                Ok(Value::Object(copy))
            })
            .revive(move |data, _| {
                let instance = ObjectRef::instance_of(class.clone());
                if let Value::Object(obj) = &data {
                    for (k, v) in obj.entries() {
                        instance.insert(k, v);
                    }
                }
                Ok(Value::Object(instance))
            })
    }

    /// Set the test
    pub fn test<T>(mut self, test: T) -> Self
    where
        T: Fn(&Value, &mut State) -> bool + Send + Sync + 'static,
    {
        self.test = Some(Arc::new(test));
        self
    }

    /// Set the synchronous replacer
    pub fn replace<R>(mut self, replace: R) -> Self
    where
        R: Fn(&Value, &mut State) -> Result<Value> + Send + Sync + 'static,
    {
        self.replace = Some(Arc::new(replace));
        self
    }

    /// Set the replacer used by asynchronous walks
    pub fn replace_async<R>(mut self, replace: R) -> Self
    where
        R: Fn(&Value, &mut State) -> Result<Value> + Send + Sync + 'static,
    {
        self.replace_async = Some(Arc::new(replace));
        self
    }

    /// Set the synchronous reviver
    pub fn revive<V>(mut self, revive: V) -> Self
    where
        V: Fn(Value, &mut State) -> Result<Value> + Send + Sync + 'static,
    {
        self.revive = Some(Arc::new(revive));
        self
    }

    /// Set the reviver used by asynchronous walks
    pub fn revive_async<V>(mut self, revive: V) -> Self
    where
        V: Fn(Value, &mut State) -> Result<Value> + Send + Sync + 'static,
    {
        self.revive_async = Some(Arc::new(revive));
        self
    }

    /// Also test plain objects and arrays
    pub fn test_plain_objects(mut self, enabled: bool) -> Self {
        self.test_plain_objects = enabled;
        self
    }

    /// Iteration mode applied to matched containers
    pub fn iterate_in(mut self, mode: IterateIn) -> Self {
        self.iterate_in = Some(mode);
        self
    }

    /// Visit unset array slots of matched containers
    pub fn iterate_unset_numeric(mut self, enabled: bool) -> Self {
        self.iterate_unset_numeric = enabled;
        self
    }

    /// Whether a test is present
    pub fn has_test(&self) -> bool {
        self.test.is_some()
    }

    /// Whether any reviver is present
    pub fn has_reviver(&self) -> bool {
        self.revive.is_some() || self.revive_async.is_some()
    }

    /// Whether plain containers are tested
    pub fn tests_plain_objects(&self) -> bool {
        self.test_plain_objects
    }

    /// Synchronous replacer
    pub fn replacer(&self) -> Option<&ReplaceFn> {
        self.replace.as_ref()
    }

    /// Asynchronous replacer
    pub fn replacer_async(&self) -> Option<&ReplaceFn> {
        self.replace_async.as_ref()
    }

    /// Synchronous reviver
    pub fn reviver(&self) -> Option<&ReviveFn> {
        self.revive.as_ref()
    }

    /// Asynchronous reviver
    pub fn reviver_async(&self) -> Option<&ReviveFn> {
        self.revive_async.as_ref()
    }

    /// Default iteration mode for matched containers
    pub fn default_iterate_in(&self) -> Option<IterateIn> {
        self.iterate_in
    }

    /// Whether matched containers visit unset slots
    pub fn visits_unset_numeric(&self) -> bool {
        self.iterate_unset_numeric
    }
}

impl fmt::Debug for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSpec")
            .field("test", &self.test.is_some())
            .field("replace", &self.replace.is_some())
            .field("replace_async", &self.replace_async.is_some())
            .field("revive", &self.revive.is_some())
            .field("revive_async", &self.revive_async.is_some())
            .field("test_plain_objects", &self.test_plain_objects)
            .field("iterate_in", &self.iterate_in)
            .field("iterate_unset_numeric", &self.iterate_unset_numeric)
            .finish()
    }
}

/// Ordered set of named type specs registered together
///
/// A `None` spec is ignored, which lets override sets leave names out.
#[derive(Debug, Clone, Default)]
pub struct TypeSet {
    entries: Vec<(String, Option<TypeSpec>)>,
}

impl TypeSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named spec
    pub fn with(mut self, name: impl Into<String>, spec: TypeSpec) -> Self {
        self.entries.push((name.into(), Some(spec)));
        self
    }

    /// Add a name with no spec
    pub fn with_none(mut self, name: impl Into<String>) -> Self {
        self.entries.push((name.into(), None));
        self
    }
}

/// One set or a nested list of sets
#[derive(Debug, Clone)]
pub enum Registration {
    /// A single set
    Set(TypeSet),
    /// Sets registered in order
    List(Vec<Registration>),
}

impl Registration {
    fn flatten_into(self, out: &mut Vec<(String, Option<TypeSpec>)>) {
        match self {
            Registration::Set(set) => out.extend(set.entries),
            Registration::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }
}

impl From<TypeSet> for Registration {
    fn from(set: TypeSet) -> Self {
        Registration::Set(set)
    }
}

impl From<Vec<TypeSet>> for Registration {
    fn from(sets: Vec<TypeSet>) -> Self {
        Registration::List(sets.into_iter().map(Registration::Set).collect())
    }
}

impl From<Vec<Registration>> for Registration {
    fn from(items: Vec<Registration>) -> Self {
        Registration::List(items)
    }
}

impl From<(&str, TypeSpec)> for Registration {
    fn from((name, spec): (&str, TypeSpec)) -> Self {
        Registration::Set(TypeSet::new().with(name, spec))
    }
}

impl From<Vec<(&str, TypeSpec)>> for Registration {
    fn from(entries: Vec<(&str, TypeSpec)>) -> Self {
        let set = entries
            .into_iter()
            .fold(TypeSet::new(), |set, (name, spec)| set.with(name, spec));
        Registration::Set(set)
    }
}

/// A named entry of the registry
#[derive(Debug)]
pub struct RegisteredType {
    name: String,
    spec: TypeSpec,
}

impl RegisteredType {
    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type spec
    pub fn spec(&self) -> &TypeSpec {
        &self.spec
    }

    fn matches(&self, value: &Value, state: &mut State) -> bool {
        self.spec.test.as_ref().map_or(false, |test| test(value, state))
    }
}

/// Ordered collection of registered types
///
/// Each instance owns its entries; there is no process-wide registry.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    primary: Vec<Arc<RegisteredType>>,
    fallback: Vec<Arc<RegisteredType>>,
}

impl TypeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register types as primary entries
    ///
    /// # Errors
    ///
    /// Returns an error, registering nothing, if any name is reserved
    pub fn register(&mut self, types: impl Into<Registration>) -> Result<&mut Self> {
        self.register_with(types, false)
    }

    /// Register types as fallback entries
    pub fn register_fallback(&mut self, types: impl Into<Registration>) -> Result<&mut Self> {
        self.register_with(types, true)
    }

    /// Register types, as fallbacks when `fallback` is set
    pub fn register_with(
        &mut self,
        types: impl Into<Registration>,
        fallback: bool,
    ) -> Result<&mut Self> {
        let mut flat = Vec::new();
        types.into().flatten_into(&mut flat);

        if let Some((name, _)) = flat.iter().find(|(name, _)| is_reserved_type_name(name)) {
            return Err(TagsonError::ReservedTypeName(name.clone()));
        }

        for (name, spec) in flat {
            let Some(spec) = spec else {
                continue;
            };
            if !spec.has_test() {
                tracing::debug!(type_name = %name, "skipping type without a test");
                continue;
            }
            self.unregister(&name);
            tracing::debug!(type_name = %name, fallback, "registered type");
            let entry = Arc::new(RegisteredType { name, spec });
            if fallback {
                self.fallback.push(entry);
            } else {
                self.primary.push(entry);
            }
        }
        Ok(self)
    }

    /// Remove a type by name
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.primary.len() + self.fallback.len();
        self.primary.retain(|entry| entry.name != name);
        self.fallback.retain(|entry| entry.name != name);
        before != self.primary.len() + self.fallback.len()
    }

    /// First entry claiming `value`
    ///
    /// Plain containers only consult entries that test plain objects; every
    /// other value only consults the rest.
    pub fn dispatch(
        &self,
        value: &Value,
        state: &mut State,
        plain: bool,
    ) -> Option<Arc<RegisteredType>> {
        self.primary
            .iter()
            .rev()
            .chain(self.fallback.iter().rev())
            .filter(|entry| entry.spec.test_plain_objects == plain)
            .find(|entry| entry.matches(value, state))
            .cloned()
    }

    /// Entry by name
    pub fn by_name(&self, name: &str) -> Option<&Arc<RegisteredType>> {
        self.primary
            .iter()
            .chain(self.fallback.iter())
            .find(|entry| entry.name == name)
    }

    /// Whether any entry tests plain containers
    pub fn has_plain_object_types(&self) -> bool {
        self.primary
            .iter()
            .chain(self.fallback.iter())
            .any(|entry| entry.spec.test_plain_objects)
    }

    /// Registered names, primary then fallback, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.primary
            .iter()
            .chain(self.fallback.iter())
            .map(|entry| entry.name.as_str())
            .collect()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.primary.len() + self.fallback.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.fallback.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always(_: &Value, _: &mut State) -> bool {
        true
    }

    fn marker(tag: &'static str) -> TypeSpec {
        TypeSpec::new(always).replace(move |_, _| Ok(Value::from(tag)))
    }

    fn dispatched(registry: &TypeRegistry, value: &Value) -> Option<String> {
        registry
            .dispatch(value, &mut State::default(), false)
            .map(|entry| entry.name().to_string())
    }

    #[test]
    fn rejects_reserved_names_atomically() {
        let mut registry = TypeRegistry::new();
        let err = registry
            .register(TypeSet::new().with("ok", marker("a")).with("#", marker("b")))
            .unwrap_err();
        assert!(matches!(err, TagsonError::ReservedTypeName(ref n) if n == "#"));
        assert!(registry.is_empty());

        for name in ["null", "boolean", "number", "string", "array", "object"] {
            assert!(registry.register((name, marker("x"))).is_err());
        }
    }

    #[test]
    fn last_registered_primary_wins() {
        let mut registry = TypeRegistry::new();
        registry.register(("first", marker("1"))).unwrap();
        registry.register(("second", marker("2"))).unwrap();
        assert_eq!(dispatched(&registry, &Value::Null).as_deref(), Some("second"));
    }

    #[test]
    fn fallback_never_shadows_primary() {
        let mut registry = TypeRegistry::new();
        registry
            .register(("specific", TypeSpec::new(|v, _| v.as_str() == Some("x"))))
            .unwrap();
        registry.register_fallback(("anything", marker("f"))).unwrap();
        assert_eq!(
            dispatched(&registry, &Value::from("x")).as_deref(),
            Some("specific")
        );
        assert_eq!(
            dispatched(&registry, &Value::from("y")).as_deref(),
            Some("anything")
        );
    }

    #[test]
    fn later_fallback_is_consulted_first() {
        let mut registry = TypeRegistry::new();
        registry.register_fallback(("old", marker("o"))).unwrap();
        registry.register_fallback(("new", marker("n"))).unwrap();
        assert_eq!(dispatched(&registry, &Value::Null).as_deref(), Some("new"));
    }

    #[test]
    fn reregistering_moves_entry_to_the_end() {
        let mut registry = TypeRegistry::new();
        registry.register(("a", marker("a"))).unwrap();
        registry.register(("b", marker("b"))).unwrap();
        registry.register(("a", marker("a2"))).unwrap();
        assert_eq!(registry.names(), vec!["b", "a"]);
        assert_eq!(dispatched(&registry, &Value::Null).as_deref(), Some("a"));

        registry.register_fallback(("b", marker("b2"))).unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn none_and_testless_entries_are_ignored() {
        let mut registry = TypeRegistry::new();
        registry.register(("keep", marker("k"))).unwrap();
        registry
            .register(
                TypeSet::new()
                    .with_none("keep")
                    .with("no_test", TypeSpec::default().revive(|v, _| Ok(v))),
            )
            .unwrap();
        assert_eq!(registry.names(), vec!["keep"]);
    }

    #[test]
    fn nested_lists_register_in_order() {
        let mut registry = TypeRegistry::new();
        let nested: Vec<Registration> = vec![
            TypeSet::new().with("a", marker("a")).into(),
            vec![
                TypeSet::new().with("b", marker("b")),
                TypeSet::new().with("c", marker("c")),
            ]
            .into(),
        ];
        registry.register(nested).unwrap();
        assert_eq!(registry.names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn plain_entries_only_see_plain_containers() {
        let mut registry = TypeRegistry::new();
        registry
            .register(("plain", marker("p").test_plain_objects(true)))
            .unwrap();
        registry.register(("other", marker("o"))).unwrap();
        let plain = registry.dispatch(&Value::object(), &mut State::default(), true);
        assert_eq!(plain.map(|e| e.name().to_string()).as_deref(), Some("plain"));
        assert!(registry.has_plain_object_types());
    }

    #[test]
    fn class_spec_recognises_independent_descriptors() {
        let spec = TypeSpec::class(Class::new("Point"));
        let mut registry = TypeRegistry::new();
        registry.register(("Point", spec)).unwrap();

        let other_copy = Arc::new(Class::new("Point"));
        let point = ObjectRef::instance_of(other_copy);
        point.insert("x", 1);
        assert_eq!(
            dispatched(&registry, &Value::Object(point)).as_deref(),
            Some("Point")
        );
    }
}
