//! Encapsulation engine
//!
//! Walks a value graph depth first and produces a plain JSON tree plus a type
//! map. Deferred branches are written as `null` placeholders, remembered with
//! their output path and the walk state at that point, and spliced in once
//! they settle. Settled branches are processed in the order they were met, so
//! the output does not depend on which deferred value settles first.

use crate::context::{IterateIn, NodeFlags, Slot, State};
use crate::observer::{EventKind, Observer, ObserverEvent};
use crate::options::{CyclicMode, EncapsulateOptions, SyncMode};
use crate::outcome::Outcome;
use crate::registry::{RegisteredType, TypeRegistry};
use crate::type_map::TypeMap;
use ahash::AHashMap;
use futures::future::{self, FutureExt};
use serde_json::{Map, Value as Json};
use smallvec::SmallVec;
use std::future::IntoFuture;
use std::sync::Arc;
use tagson_format::classify::{is_plain_object, is_user_object};
use tagson_format::constants::{BACK_REFERENCE, DATA_MARKER, LENGTH_KEY, TYPES_MARKER};
use tagson_format::{
    keypath, number_to_json, ArrayRef, Deferred, Limits, ObjectRef, Result, Shape, TagsonError,
    Value,
};

/// Output path of a node, root first
type SlotPath = SmallVec<[Slot; 8]>;

/// A branch waiting on a deferred value
struct PendingBranch {
    keypath: String,
    path: SlotPath,
    deferred: Deferred,
    cyclic: CyclicMode,
    flags: NodeFlags,
    depth: usize,
    ancestors: Vec<usize>,
}

/// State of one encapsulation call
pub(crate) struct Encapsulator {
    registry: Arc<TypeRegistry>,
    mode: SyncMode,
    cyclic: CyclicMode,
    limits: Limits,
    observer: Option<Observer>,
    iterate_none: bool,
    types: TypeMap,
    // identity -> first keypath; the value keeps the address alive
    refs: AHashMap<usize, (String, Value)>,
    ancestors: Vec<usize>,
    depth: usize,
    pending: Vec<PendingBranch>,
}

impl Encapsulator {
    pub(crate) fn new(registry: Arc<TypeRegistry>, options: &EncapsulateOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            registry,
            mode: options.mode,
            cyclic: options.cyclic,
            limits: options.limits.clone(),
            observer: options.observer.clone(),
            iterate_none: false,
            types: TypeMap::new(),
            refs: AHashMap::new(),
            ancestors: Vec::new(),
            depth: 0,
            pending: Vec::new(),
        })
    }

    /// Only visit the root; containers are emitted empty
    pub(crate) fn iterate_none(mut self) -> Self {
        self.iterate_none = true;
        self
    }

    /// Encapsulate `root`, deferring the packaging while branches are pending
    pub(crate) fn run(mut self, root: &Value, mut state: State) -> Result<Outcome<Json>> {
        let mut path = SlotPath::new();
        let cyclic = self.cyclic;
        let tree = self.walk("", root, &mut state, cyclic, &mut path)?;

        if self.pending.is_empty() {
            if self.mode == SyncMode::Async {
                return Err(TagsonError::ModeMismatch {
                    expected: Shape::Async,
                    found: Shape::Sync,
                    keypath: String::new(),
                });
            }
            tracing::debug!(types = self.types.len(), "encapsulated synchronously");
            return Ok(Outcome::Ready(self.finish(tree)));
        }

        tracing::debug!(
            pending = self.pending.len(),
            "encapsulation waiting on deferred branches"
        );
        Ok(Outcome::Pending(self.drive(tree, state).boxed_local()))
    }

    /// Walk `root` and return the types detected, ignoring pending branches
    pub(crate) fn detect_types(mut self, root: &Value, mut state: State) -> Result<TypeMap> {
        let mut path = SlotPath::new();
        let cyclic = self.cyclic;
        self.walk("", root, &mut state, cyclic, &mut path)?;
        Ok(self.types)
    }

    async fn drive(mut self, mut tree: Option<Json>, mut state: State) -> Result<Json> {
        while !self.pending.is_empty() {
            let batch = std::mem::take(&mut self.pending);
            let settled =
                future::join_all(batch.iter().map(|b| b.deferred.clone().into_future())).await;

            for (branch, result) in batch.into_iter().zip(settled) {
                let PendingBranch {
                    keypath,
                    mut path,
                    cyclic,
                    flags,
                    depth,
                    ancestors,
                    ..
                } = branch;
                let resolved = result.map_err(|e| e.at(&keypath, flags.type_name.as_deref()))?;

                state.flags = flags;
                state.flags.replaced_source = None;
                state.set_keypath(&keypath);
                self.depth = depth;
                self.ancestors = ancestors;
                self.observe(&keypath, &resolved, &state, cyclic, || {
                    EventKind::ResolvingDeferred
                });

                let json = self.walk(&keypath, &resolved, &mut state, cyclic, &mut path)?;
                if json.is_none() {
                    self.types.remove(&keypath);
                }
                splice(&mut tree, &path, json);
            }
        }
        tracing::debug!(types = self.types.len(), "encapsulated asynchronously");
        Ok(self.finish(tree))
    }

    fn finish(self, tree: Option<Json>) -> Json {
        package(tree.unwrap_or(Json::Null), &self.types)
    }

    fn observe<F>(&self, keypath: &str, value: &Value, state: &State, cyclic: CyclicMode, kind: F)
    where
        F: FnOnce() -> EventKind,
    {
        if let Some(observer) = &self.observer {
            observer(&ObserverEvent {
                keypath,
                value,
                cyclic,
                replaced: state.flags.replaced,
                kind: kind(),
            });
        }
    }

    /// Encapsulate one node; `None` means the node is omitted
    fn walk(
        &mut self,
        keypath: &str,
        value: &Value,
        state: &mut State,
        cyclic: CyclicMode,
        path: &mut SlotPath,
    ) -> Result<Option<Json>> {
        state.set_keypath(keypath);

        let primitive = match value {
            Value::Null => Some(Json::Null),
            Value::Bool(b) => Some(Json::Bool(*b)),
            Value::String(s) => Some(Json::String(s.clone())),
            Value::Number(n) => number_to_json(*n),
            _ => None,
        };
        if let Some(json) = primitive {
            self.observe(keypath, value, state, cyclic, || EventKind::Primitive);
            return Ok(Some(json));
        }

        if matches!(value, Value::Array(_) | Value::Object(_)) {
            if let Some(reference) = self.check_cycle(keypath, value, state, cyclic)? {
                return Ok(Some(reference));
            }
        }

        if let Some(entry) = self.detect(value, state) {
            return self.replace(keypath, value, &entry, state, cyclic, path);
        }

        match value {
            Value::Number(n) => Err(TagsonError::Unrepresentable {
                keypath: keypath.to_string(),
                kind: format!("number {}", n),
            }),
            Value::Undefined => Ok(None),
            Value::Deferred(deferred) => self.defer(keypath, deferred, state, cyclic, path),
            Value::Object(obj) if !is_user_object(value) => Err(TagsonError::Unrepresentable {
                keypath: keypath.to_string(),
                kind: obj
                    .class()
                    .map_or_else(|| "object".to_string(), |c| c.string_tag().to_string()),
            }),
            _ => self.walk_container(keypath, value, state, cyclic, path),
        }
    }

    /// Back-reference for a repeated container, if any
    fn check_cycle(
        &mut self,
        keypath: &str,
        value: &Value,
        state: &State,
        cyclic: CyclicMode,
    ) -> Result<Option<Json>> {
        let Some(identity) = value.addr() else {
            return Ok(None);
        };
        if cyclic == CyclicMode::Disabled {
            if self.ancestors.contains(&identity) {
                return Err(TagsonError::CycleDetected {
                    keypath: keypath.to_string(),
                });
            }
            return Ok(None);
        }
        if state.flags.iterate_in.is_some() || state.flags.iterate_unset_numeric {
            return Ok(None);
        }

        match self.refs.get(&identity) {
            // Same node visited again at its own keypath (a replacement pass)
            Some((first, _)) if first == keypath => Ok(None),
            Some((first, _)) => {
                let target = first.clone();
                tracing::trace!(keypath, target = %target, "back-reference");
                self.observe(keypath, value, state, cyclic, || EventKind::Cyclic {
                    target: target.clone(),
                });
                self.types.mark_back_reference(keypath);
                Ok(Some(Json::String(format!("{}{}", BACK_REFERENCE, target))))
            }
            None => {
                if cyclic == CyclicMode::Enabled {
                    self.refs
                        .insert(identity, (keypath.to_string(), value.clone()));
                }
                Ok(None)
            }
        }
    }

    /// Registered type claiming `value`, if it should be consulted at all
    fn detect(&self, value: &Value, state: &mut State) -> Option<Arc<RegisteredType>> {
        if state.flags.replaced_source == Some(value.addr().unwrap_or(0)) {
            return None;
        }
        match value {
            Value::Array(_) | Value::Object(_) if is_plain_container(value) => {
                if state.flags.replaced || !self.registry.has_plain_object_types() {
                    return None;
                }
                self.registry.dispatch(value, state, true)
            }
            // Replacement output of these kinds is taken as final
            Value::Undefined | Value::Number(_) | Value::Deferred(_) if state.flags.replaced => None,
            _ => self.registry.dispatch(value, state, false),
        }
    }

    fn replace(
        &mut self,
        keypath: &str,
        value: &Value,
        entry: &RegisteredType,
        state: &mut State,
        cyclic: CyclicMode,
        path: &mut SlotPath,
    ) -> Result<Option<Json>> {
        let name = entry.name();
        let spec = entry.spec();
        tracing::trace!(keypath, type_name = name, "type detected");
        self.observe(keypath, value, state, cyclic, || EventKind::TypeDetected {
            type_name: name.to_string(),
        });

        state.flags.chain_len += 1;
        if state.flags.chain_len > self.limits.max_type_chain {
            return Err(TagsonError::LimitExceeded(format!(
                "more than {} chained types at keypath '{}'",
                self.limits.max_type_chain, keypath
            )));
        }
        if let Some(mode) = spec.default_iterate_in() {
            state.flags.iterate_in = Some(mode);
        }
        if spec.visits_unset_numeric() {
            state.flags.iterate_unset_numeric = true;
        }
        if spec.has_reviver() {
            self.types.prepend(keypath, name);
        }
        state.flags.type_name = Some(name.to_string());

        let replacer = match self.mode {
            SyncMode::Sync => match (spec.replacer(), spec.replacer_async()) {
                (Some(replacer), _) => Some(replacer),
                (None, Some(_)) => {
                    return Err(TagsonError::ModeMismatch {
                        expected: Shape::Sync,
                        found: Shape::Async,
                        keypath: keypath.to_string(),
                    })
                }
                (None, None) => None,
            },
            SyncMode::Async => spec.replacer_async().or(spec.replacer()),
            SyncMode::Auto => spec.replacer().or(spec.replacer_async()),
        }
        .cloned();

        let Some(replacer) = replacer else {
            // Annotate only; the value itself is encoded without dispatch
            state.flags.replaced_source = Some(value.addr().unwrap_or(0));
            return self.walk(keypath, value, state, cyclic.for_replacement(), path);
        };

        self.observe(keypath, value, state, cyclic, || EventKind::Replacing {
            type_name: name.to_string(),
        });
        let replaced = replacer(value, state).map_err(|e| e.at(keypath, Some(name)))?;
        state.set_keypath(keypath);
        state.flags.replaced = true;
        state.flags.replaced_source = None;
        self.walk(keypath, &replaced, state, cyclic.for_replacement(), path)
    }

    fn defer(
        &mut self,
        keypath: &str,
        deferred: &Deferred,
        state: &State,
        cyclic: CyclicMode,
        path: &SlotPath,
    ) -> Result<Option<Json>> {
        if self.mode == SyncMode::Sync {
            return Err(TagsonError::ModeMismatch {
                expected: Shape::Sync,
                found: Shape::Async,
                keypath: keypath.to_string(),
            });
        }
        tracing::trace!(keypath, "awaiting deferred branch");
        self.observe(
            keypath,
            &Value::Deferred(deferred.clone()),
            state,
            cyclic,
            || EventKind::AwaitingDeferred,
        );
        let ancestors = if cyclic == CyclicMode::Disabled {
            self.ancestors.clone()
        } else {
            Vec::new()
        };
        self.pending.push(PendingBranch {
            keypath: keypath.to_string(),
            path: path.clone(),
            deferred: deferred.clone(),
            cyclic,
            flags: state.flags.clone(),
            depth: self.depth,
            ancestors,
        });
        Ok(Some(Json::Null))
    }

    fn walk_container(
        &mut self,
        keypath: &str,
        value: &Value,
        state: &mut State,
        cyclic: CyclicMode,
        path: &mut SlotPath,
    ) -> Result<Option<Json>> {
        self.depth += 1;
        if self.depth > self.limits.max_depth {
            return Err(TagsonError::LimitExceeded(format!(
                "nesting depth exceeds {} at keypath '{}'",
                self.limits.max_depth, keypath
            )));
        }
        self.observe(keypath, value, state, cyclic, || EventKind::Enter);

        let identity = value.addr().unwrap_or(0);
        let track = cyclic == CyclicMode::Disabled;
        if track {
            self.ancestors.push(identity);
        }

        let children = cyclic.for_children();
        let mode = state.flags.iterate_in.unwrap_or(match value {
            Value::Array(_) => IterateIn::Array,
            _ => IterateIn::Object,
        });
        let out = match (value, mode) {
            _ if self.iterate_none => match mode {
                IterateIn::Array => Json::Array(Vec::new()),
                IterateIn::Object => Json::Object(Map::new()),
            },
            (Value::Array(arr), IterateIn::Array) => {
                Json::Array(self.array_to_array(keypath, arr, state, children, path)?)
            }
            (Value::Array(arr), IterateIn::Object) => {
                Json::Object(self.array_to_object(keypath, arr, state, children, path)?)
            }
            (Value::Object(obj), IterateIn::Array) => {
                Json::Array(self.object_to_array(keypath, obj, state, children, path)?)
            }
            (Value::Object(obj), IterateIn::Object) => {
                Json::Object(self.object_to_object(keypath, obj, state, children, path)?)
            }
            _ => Json::Null,
        };

        if track {
            self.ancestors.pop();
        }
        self.depth -= 1;
        self.observe(keypath, value, state, cyclic, || EventKind::Leave);
        Ok(Some(out))
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_child(
        &mut self,
        keypath: &str,
        slot: Slot,
        child: &Value,
        own_key: bool,
        state: &mut State,
        cyclic: CyclicMode,
        path: &mut SlotPath,
    ) -> Result<Option<Json>> {
        let child_keypath = match &slot {
            Slot::Key(key) => keypath::join(keypath, key),
            Slot::Index(index) => keypath::join(keypath, &index.to_string()),
        };
        let saved = state.enter_child(own_key);
        path.push(slot);
        let result = self.walk(&child_keypath, child, state, cyclic, path);
        path.pop();
        state.leave_child(saved);
        state.set_keypath(keypath);
        result
    }

    fn array_to_array(
        &mut self,
        keypath: &str,
        arr: &ArrayRef,
        state: &mut State,
        cyclic: CyclicMode,
        path: &mut SlotPath,
    ) -> Result<Vec<Json>> {
        let slots = arr.slots();
        let unset = state.flags.iterate_unset_numeric;
        let mut out = vec![Json::Null; slots.len()];
        for (index, slot) in slots.into_iter().enumerate() {
            let (child, own_key) = match slot {
                Some(child) => (child, true),
                None if unset => (Value::Undefined, false),
                None => continue,
            };
            let slot = Slot::Index(index);
            if let Some(json) =
                self.visit_child(keypath, slot, &child, own_key, state, cyclic, path)?
            {
                out[index] = json;
            }
        }
        Ok(out)
    }

    fn array_to_object(
        &mut self,
        keypath: &str,
        arr: &ArrayRef,
        state: &mut State,
        cyclic: CyclicMode,
        path: &mut SlotPath,
    ) -> Result<Map<String, Json>> {
        let slots = arr.slots();
        let unset = state.flags.iterate_unset_numeric;
        let add_length = state.flags.add_length;
        let len = slots.len();
        let mut out = Map::new();
        for (index, slot) in slots.into_iter().enumerate() {
            let (child, own_key) = match slot {
                Some(child) => (child, true),
                None if unset => (Value::Undefined, false),
                None => continue,
            };
            let key = index.to_string();
            let slot = Slot::Key(key.clone());
            if let Some(json) =
                self.visit_child(keypath, slot, &child, own_key, state, cyclic, path)?
            {
                out.insert(key, json);
            }
        }
        if add_length {
            out.insert(LENGTH_KEY.to_string(), Json::from(len));
        }
        Ok(out)
    }

    fn object_to_object(
        &mut self,
        keypath: &str,
        obj: &ObjectRef,
        state: &mut State,
        cyclic: CyclicMode,
        path: &mut SlotPath,
    ) -> Result<Map<String, Json>> {
        let mut out = Map::new();
        for (key, child) in obj.entries() {
            let slot = Slot::Key(key.clone());
            if let Some(json) = self.visit_child(keypath, slot, &child, true, state, cyclic, path)? {
                out.insert(key, json);
            }
        }
        Ok(out)
    }

    /// Numeric properties of an object laid out as an array
    fn object_to_array(
        &mut self,
        keypath: &str,
        obj: &ObjectRef,
        state: &mut State,
        cyclic: CyclicMode,
        path: &mut SlotPath,
    ) -> Result<Vec<Json>> {
        let numeric: Vec<(usize, Value)> = obj
            .entries()
            .into_iter()
            .filter_map(|(key, child)| key.parse::<usize>().ok().map(|index| (index, child)))
            .collect();
        let len = numeric.iter().map(|(index, _)| index + 1).max().unwrap_or(0);
        if len > self.limits.max_array_len {
            return Err(TagsonError::LimitExceeded(format!(
                "array of length {} exceeds max_array_len {} at keypath '{}'",
                len, self.limits.max_array_len, keypath
            )));
        }
        let mut out = vec![Json::Null; len];
        for (index, child) in numeric {
            let slot = Slot::Index(index);
            if let Some(json) = self.visit_child(keypath, slot, &child, true, state, cyclic, path)? {
                out[index] = json;
            }
        }
        Ok(out)
    }
}

/// Plain object or array
fn is_plain_container(value: &Value) -> bool {
    matches!(value, Value::Array(_)) || is_plain_object(value)
}

/// Write a settled branch into the output tree
fn splice(tree: &mut Option<Json>, path: &[Slot], json: Option<Json>) {
    let Some((last, parents)) = path.split_last() else {
        *tree = json;
        return;
    };
    let Some(mut node) = tree.as_mut() else {
        return;
    };
    for slot in parents {
        let next = match (node, slot) {
            (Json::Object(map), Slot::Key(key)) => map.get_mut(key),
            (Json::Array(items), Slot::Index(index)) => items.get_mut(*index),
            _ => None,
        };
        match next {
            Some(child) => node = child,
            None => return,
        }
    }
    match (node, last, json) {
        (Json::Object(map), Slot::Key(key), Some(json)) => {
            map.insert(key.clone(), json);
        }
        (Json::Object(map), Slot::Key(key), None) => {
            map.shift_remove(key);
        }
        (Json::Array(items), Slot::Index(index), json) => {
            if let Some(item) = items.get_mut(*index) {
                *item = json.unwrap_or(Json::Null);
            }
        }
        _ => {}
    }
}

/// Attach the type map to the encapsulated tree
///
/// The map rides on the root object when it can; otherwise the tree is
/// wrapped as `{"$": tree, "$types": {"$": map}}`. A root object that already
/// owns `$types` is wrapped even without types, with `"$types": true`, so
/// that revival hands it back untouched.
pub(crate) fn package(tree: Json, types: &TypeMap) -> Json {
    if types.is_empty() {
        return match tree {
            Json::Object(map) if map.contains_key(TYPES_MARKER) => {
                wrap(Json::Object(map), Json::Bool(true))
            }
            other => other,
        };
    }
    match tree {
        Json::Object(mut map) if !map.contains_key(TYPES_MARKER) => {
            map.insert(TYPES_MARKER.to_string(), types.to_json());
            Json::Object(map)
        }
        other => {
            let mut inner = Map::new();
            inner.insert(DATA_MARKER.to_string(), types.to_json());
            wrap(other, Json::Object(inner))
        }
    }
}

fn wrap(tree: Json, types: Json) -> Json {
    let mut outer = Map::new();
    outer.insert(DATA_MARKER.to_string(), tree);
    outer.insert(TYPES_MARKER.to_string(), types);
    Json::Object(outer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{TypeSet, TypeSpec};
    use serde_json::json;

    fn encapsulate(registry: TypeRegistry, value: &Value) -> Result<Json> {
        let enc = Encapsulator::new(Arc::new(registry), &EncapsulateOptions::default())?;
        match enc.run(value, State::default())? {
            Outcome::Ready(json) => Ok(json),
            Outcome::Pending(_) => panic!("unexpected pending result"),
        }
    }

    #[test]
    fn plain_values_pass_through() {
        let value = Value::from_json(&json!({"a": [1, "x", null, true], "b": {"c": 1.5}}));
        let out = encapsulate(TypeRegistry::new(), &value).unwrap();
        assert_eq!(out, json!({"a": [1, "x", null, true], "b": {"c": 1.5}}));
    }

    #[test]
    fn undefined_properties_are_omitted() {
        let value = Value::object_from([("a", Value::Undefined), ("b", Value::from(1))]);
        assert_eq!(encapsulate(TypeRegistry::new(), &value).unwrap(), json!({"b": 1}));
        assert_eq!(encapsulate(TypeRegistry::new(), &Value::Undefined).unwrap(), Json::Null);
    }

    #[test]
    fn holes_become_null() {
        let arr = ArrayRef::with_len(3);
        arr.set(1, 7);
        let out = encapsulate(TypeRegistry::new(), &Value::Array(arr)).unwrap();
        assert_eq!(out, json!([null, 7, null]));
    }

    #[test]
    fn cycles_become_back_references() {
        let obj = ObjectRef::new();
        let child = ObjectRef::new();
        child.insert("up", obj.clone());
        obj.insert("child", child);
        let out = encapsulate(TypeRegistry::new(), &Value::Object(obj)).unwrap();
        assert_eq!(out, json!({"child": {"up": "#"}, "$types": {"child.up": "#"}}));
    }

    #[test]
    fn disabled_cycles_fail() {
        let obj = ObjectRef::new();
        obj.insert("me", obj.clone());
        let opts = EncapsulateOptions {
            cyclic: CyclicMode::Disabled,
            ..EncapsulateOptions::default()
        };
        let enc = Encapsulator::new(Arc::new(TypeRegistry::new()), &opts).unwrap();
        let err = enc.run(&Value::Object(obj), State::default()).unwrap_err();
        assert!(matches!(err, TagsonError::CycleDetected { ref keypath } if keypath == "me"));
    }

    #[test]
    fn disabled_mode_allows_shared_siblings() {
        let shared = Value::array([1]);
        let value = Value::object_from([("a", shared.clone()), ("b", shared)]);
        let opts = EncapsulateOptions {
            cyclic: CyclicMode::Disabled,
            ..EncapsulateOptions::default()
        };
        let enc = Encapsulator::new(Arc::new(TypeRegistry::new()), &opts).unwrap();
        let out = enc.run(&value, State::default()).unwrap().ready().unwrap();
        assert_eq!(out, json!({"a": [1], "b": [1]}));
    }

    #[test]
    fn special_numbers_need_a_type() {
        let err = encapsulate(TypeRegistry::new(), &Value::array([f64::NAN])).unwrap_err();
        assert!(matches!(err, TagsonError::Unrepresentable { ref keypath, .. } if keypath == "0"));

        let mut registry = TypeRegistry::new();
        registry
            .register(TypeSet::new().with(
                "NaN",
                TypeSpec::new(|v, _| v.as_f64().map_or(false, f64::is_nan))
                    .replace(|_, _| Ok(Value::from("NaN")))
                    .revive(|_, _| Ok(Value::Number(f64::NAN))),
            ))
            .unwrap();
        let out = encapsulate(registry, &Value::array([f64::NAN])).unwrap();
        assert_eq!(out, json!({"$": ["NaN"], "$types": {"$": {"0": "NaN"}}}));
    }

    #[test]
    fn replace_only_types_leave_no_annotation() {
        let mut registry = TypeRegistry::new();
        registry
            .register((
                "secret",
                TypeSpec::new(|v, _| v.as_str().is_some())
                    .replace(|_, _| Ok(Value::from("***"))),
            ))
            .unwrap();
        // Strings are never dispatched
        let out = encapsulate(registry, &Value::object_from([("p", "pw")])).unwrap();
        assert_eq!(out, json!({"p": "pw"}));
    }

    #[test]
    fn depth_limit_applies() {
        let mut value = Value::array([1]);
        for _ in 0..10 {
            value = Value::array([value]);
        }
        let opts = EncapsulateOptions {
            limits: Limits {
                max_depth: 5,
                ..Limits::default()
            },
            ..EncapsulateOptions::default()
        };
        let enc = Encapsulator::new(Arc::new(TypeRegistry::new()), &opts).unwrap();
        assert!(matches!(
            enc.run(&value, State::default()),
            Err(TagsonError::LimitExceeded(_))
        ));
    }

    #[test]
    fn numeric_keys_beyond_array_limit_are_rejected() {
        let mut registry = TypeRegistry::new();
        registry
            .register((
                "indexed",
                TypeSpec::new(|v, _| v.as_object().map_or(false, |o| o.contains_key("0")))
                    .test_plain_objects(true)
                    .replace(|v, _| Ok(v.clone()))
                    .iterate_in(IterateIn::Array)
                    .revive(|v, _| Ok(v)),
            ))
            .unwrap();
        let value = Value::object_from([("0", "a"), ("4000000000", "b")]);
        let err = encapsulate(registry.clone(), &value).unwrap_err();
        assert!(matches!(err, TagsonError::LimitExceeded(_)));

        let value = Value::object_from([("0", "a"), ("2", "b")]);
        let out = encapsulate(registry, &value).unwrap();
        assert_eq!(out, json!({"$": ["a", null, "b"], "$types": {"$": {"": "indexed"}}}));
    }

    #[test]
    fn packaging_keeps_reserved_root_key() {
        let tree = json!({"$types": 1});
        assert_eq!(
            package(tree.clone(), &TypeMap::new()),
            json!({"$": {"$types": 1}, "$types": true})
        );
        let mut types = TypeMap::new();
        types.prepend("a", "x");
        assert_eq!(
            package(tree, &types),
            json!({"$": {"$types": 1}, "$types": {"$": {"a": "x"}}})
        );
    }

    #[test]
    fn splice_replaces_and_removes() {
        let mut tree = Some(json!({"a": null, "b": [null, 2], "c": 3}));
        splice(&mut tree, &[Slot::Key("a".into())], Some(json!(1)));
        splice(
            &mut tree,
            &[Slot::Key("b".into()), Slot::Index(0)],
            Some(json!(5)),
        );
        splice(&mut tree, &[Slot::Key("c".into())], None);
        assert_eq!(tree, Some(json!({"a": 1, "b": [5, 2]})));
    }
}
