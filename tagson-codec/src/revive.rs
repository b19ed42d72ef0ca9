//! Revival engine
//!
//! Rebuilds a value graph from a plain tree and its type map. Containers are
//! created before their children are visited and, unless typed, registered
//! under their keypath right away, so back-references into an ancestor
//! resolve to the very container being filled. Typed nodes are registered
//! once their last reviver has run; references that arrive earlier are
//! queued by the keypath of the slot's parent and patched into whatever that
//! parent finally revives to.

use crate::context::{Slot, State};
use crate::options::{ReviveOptions, SyncMode};
use crate::outcome::Outcome;
use crate::registry::{ReviveFn, TypeRegistry};
use crate::type_map::{TypeMap, TypeTag};
use ahash::AHashMap;
use futures::future::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value as Json};
use std::future::IntoFuture;
use std::sync::Arc;
use tagson_format::constants::{BACK_REFERENCE, DATA_MARKER, TYPES_MARKER};
use tagson_format::{
    keypath, ArrayRef, Deferred, Limits, ObjectRef, Resolver, Result, Shape, TagsonError, Value,
};

/// Where a revived value goes
enum Target {
    Root,
    Slot(Value, Slot),
}

/// A typed node whose reviver chain is waiting on a deferred value
struct PendingNode {
    keypath: String,
    deferred: Deferred,
    remaining: Vec<String>,
}

/// A reference slot waiting for its target
struct Fixup {
    parent: String,
    slot: Slot,
}

struct PendingRevival {
    node: PendingNode,
    target: Target,
    // Typed ancestors waiting for this node to settle
    notify: Vec<Resolver>,
}

enum Node {
    Ready(Value),
    Pending(PendingNode),
    Reference(String),
}

static NULL: Json = Json::Null;

/// Tree and type map found in an encapsulated document
enum Prepared<'a> {
    Plain(&'a Json),
    Typed {
        tree: &'a Json,
        types: TypeMap,
        skip_types_key: bool,
    },
}

/// Split an encapsulated document into its tree and type map
fn prepare(json: &Json) -> Result<Prepared<'_>> {
    let Json::Object(root) = json else {
        return Ok(Prepared::Plain(json));
    };
    match root.get(TYPES_MARKER) {
        Some(Json::Bool(true)) => Ok(Prepared::Plain(root.get(DATA_MARKER).unwrap_or(&NULL))),
        Some(Json::Object(map)) => match map.get(DATA_MARKER) {
            Some(Json::Object(inner)) => Ok(Prepared::Typed {
                tree: root.get(DATA_MARKER).unwrap_or(&NULL),
                types: TypeMap::from_json(inner)?,
                skip_types_key: false,
            }),
            _ => Ok(Prepared::Typed {
                tree: json,
                types: TypeMap::from_json(map)?,
                skip_types_key: true,
            }),
        },
        _ => Ok(Prepared::Plain(json)),
    }
}

/// State of one revival call
pub(crate) struct Reviver {
    registry: Arc<TypeRegistry>,
    mode: SyncMode,
    limits: Limits,
    types: TypeMap,
    arena: AHashMap<String, Value>,
    // target keypath -> slots referring to it
    fixups: AHashMap<String, Vec<Fixup>>,
    // parent keypath -> settled references whose parent is still reviving
    orphans: AHashMap<String, Vec<(Slot, Value)>>,
    pending: Vec<PendingRevival>,
    depth: usize,
}

impl Reviver {
    pub(crate) fn new(registry: Arc<TypeRegistry>, options: &ReviveOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            registry,
            mode: options.mode,
            limits: options.limits.clone(),
            types: TypeMap::new(),
            arena: AHashMap::new(),
            fixups: AHashMap::new(),
            orphans: AHashMap::new(),
            pending: Vec::new(),
            depth: 0,
        })
    }

    pub(crate) fn run(mut self, json: &Json, mut state: State) -> Result<Outcome<Value>> {
        let (tree, types, skip_types_key) = match prepare(json)? {
            Prepared::Plain(tree) => {
                self.require_sync_result()?;
                return Ok(Outcome::Ready(Value::from_json(tree)));
            }
            Prepared::Typed {
                tree,
                types,
                skip_types_key,
            } => (tree, types, skip_types_key),
        };
        self.types = types;

        let root = match self.walk("", tree, skip_types_key, &mut state)? {
            Node::Ready(value) => value,
            Node::Pending(node) => {
                self.pending.push(PendingRevival {
                    node,
                    target: Target::Root,
                    notify: Vec::new(),
                });
                Value::Undefined
            }
            Node::Reference(_) => {
                return Err(TagsonError::InvalidTypeMap(
                    "the root cannot be a back-reference".to_string(),
                ))
            }
        };

        if self.pending.is_empty() {
            self.require_sync_result()?;
            tracing::debug!(types = self.types.len(), "revived synchronously");
            return Ok(Outcome::Ready(self.finish(root)));
        }
        tracing::debug!(
            pending = self.pending.len(),
            "revival waiting on deferred revivers"
        );
        Ok(Outcome::Pending(self.drive(root, state).boxed_local()))
    }

    fn require_sync_result(&self) -> Result<()> {
        if self.mode == SyncMode::Async {
            return Err(TagsonError::ModeMismatch {
                expected: Shape::Async,
                found: Shape::Sync,
                keypath: String::new(),
            });
        }
        Ok(())
    }

    async fn drive(mut self, mut root: Value, mut state: State) -> Result<Value> {
        let mut inflight = FuturesUnordered::new();
        loop {
            for pending in self.pending.drain(..) {
                let settle = pending.node.deferred.clone().into_future();
                inflight.push(async move { (pending, settle.await) }.boxed_local());
            }
            let Some((pending, result)) = inflight.next().await else {
                break;
            };

            let PendingRevival {
                node,
                target,
                notify,
            } = pending;
            let value = result.map_err(|e| e.at(&node.keypath, None))?;
            match self.apply_chain(&node.keypath, value, node.remaining, &mut state)? {
                Node::Pending(next) => self.pending.push(PendingRevival {
                    node: next,
                    target,
                    notify,
                }),
                Node::Ready(value) => {
                    assign(&mut root, target, value);
                    for resolver in notify {
                        resolver.resolve(Value::Null);
                    }
                }
                Node::Reference(_) => {}
            }
        }
        tracing::debug!(types = self.types.len(), "revived asynchronously");
        Ok(self.finish(root))
    }

    /// Patch references left over once the whole tree is revived
    fn finish(mut self, root: Value) -> Value {
        for (target, waiting) in std::mem::take(&mut self.fixups) {
            let Some(value) = keypath::resolve(&root, &target) else {
                tracing::warn!(keypath = %target, "unresolved back-reference left undefined");
                continue;
            };
            for fixup in waiting {
                self.patch(fixup, value.clone());
            }
        }
        for (parent, slots) in std::mem::take(&mut self.orphans) {
            let Some(container) = keypath::resolve(&root, &parent) else {
                tracing::warn!(keypath = %parent, "back-reference parent missing from the result");
                continue;
            };
            for (slot, value) in slots {
                set_slot(&container, &slot, value);
            }
        }
        root
    }

    fn walk(
        &mut self,
        keypath: &str,
        json: &Json,
        skip_types_key: bool,
        state: &mut State,
    ) -> Result<Node> {
        let names = match self.types.get(keypath) {
            Some(TypeTag::BackReference) => {
                let target = json
                    .as_str()
                    .and_then(|s| s.strip_prefix(BACK_REFERENCE))
                    .ok_or_else(|| {
                        TagsonError::InvalidTypeMap(format!(
                            "back-reference at '{}' is not a '{}' string",
                            keypath, BACK_REFERENCE
                        ))
                    })?;
                return Ok(Node::Reference(target.to_string()));
            }
            Some(tag) => tag.names(),
            None => Vec::new(),
        };
        if names.len() > self.limits.max_type_chain {
            return Err(TagsonError::LimitExceeded(format!(
                "{} chained types at keypath '{}' exceed the limit of {}",
                names.len(),
                keypath,
                self.limits.max_type_chain
            )));
        }
        let typed = !names.is_empty();
        let pending_before = self.pending.len();

        let value = match json {
            Json::Array(items) => {
                self.enter(keypath)?;
                let arr = ArrayRef::with_len(items.len());
                let value = Value::Array(arr);
                if !typed {
                    self.register(keypath, &value);
                }
                for (index, item) in items.iter().enumerate() {
                    let child_keypath = keypath::join(keypath, &index.to_string());
                    let node = self.walk(&child_keypath, item, false, state)?;
                    self.place(&value, keypath, Slot::Index(index), node);
                }
                self.depth -= 1;
                value
            }
            Json::Object(map) => {
                self.enter(keypath)?;
                let value = Value::Object(ObjectRef::new());
                if !typed {
                    self.register(keypath, &value);
                }
                self.walk_object(keypath, &value, map, skip_types_key, state)?;
                self.depth -= 1;
                value
            }
            primitive => Value::from_json(primitive),
        };

        if !typed {
            return Ok(Node::Ready(value));
        }
        if self.pending.len() > pending_before {
            return Ok(Node::Pending(self.gate(keypath, value, names, pending_before)));
        }
        self.apply_chain(keypath, value, names, state)
    }

    fn walk_object(
        &mut self,
        keypath: &str,
        value: &Value,
        map: &Map<String, Json>,
        skip_types_key: bool,
        state: &mut State,
    ) -> Result<()> {
        for (key, item) in map {
            if skip_types_key && key == TYPES_MARKER {
                continue;
            }
            let child_keypath = keypath::join(keypath, key);
            let node = self.walk(&child_keypath, item, false, state)?;
            self.place(value, keypath, Slot::Key(key.clone()), node);
        }
        Ok(())
    }

    fn enter(&mut self, keypath: &str) -> Result<()> {
        self.depth += 1;
        if self.depth > self.limits.max_depth {
            return Err(TagsonError::LimitExceeded(format!(
                "nesting depth exceeds {} at keypath '{}'",
                self.limits.max_depth, keypath
            )));
        }
        Ok(())
    }

    /// Hold a typed container back until its pending descendants settle
    fn gate(
        &mut self,
        keypath: &str,
        value: Value,
        names: Vec<String>,
        pending_before: usize,
    ) -> PendingNode {
        let mut waits = Vec::new();
        for pending in &mut self.pending[pending_before..] {
            let (settled, resolver) = Deferred::channel();
            pending.notify.push(resolver);
            waits.push(Value::Deferred(settled));
        }
        tracing::trace!(
            keypath,
            waiting = waits.len(),
            "typed node waiting on descendants"
        );
        PendingNode {
            keypath: keypath.to_string(),
            deferred: Deferred::all(waits).then(move |_| Ok(value)),
            remaining: names,
        }
    }

    /// Run the revivers of `names` in order
    fn apply_chain(
        &mut self,
        keypath: &str,
        mut value: Value,
        names: Vec<String>,
        state: &mut State,
    ) -> Result<Node> {
        let mut names = names.into_iter();
        while let Some(name) = names.next() {
            let reviver = self
                .select_reviver(keypath, &name)
                .map_err(|e| e.at(keypath, Some(&name)))?;
            state.set_keypath(keypath);
            state.flags.type_name = Some(name.clone());
            tracing::trace!(keypath, type_name = %name, "reviving");
            value = reviver(value, state).map_err(|e| e.at(keypath, Some(&name)))?;

            if let Value::Deferred(deferred) = value {
                if self.mode == SyncMode::Sync {
                    return Err(TagsonError::ModeMismatch {
                        expected: Shape::Sync,
                        found: Shape::Async,
                        keypath: keypath.to_string(),
                    });
                }
                return Ok(Node::Pending(PendingNode {
                    keypath: keypath.to_string(),
                    deferred,
                    remaining: names.collect(),
                }));
            }
        }
        state.flags.type_name = None;
        self.register(keypath, &value);
        Ok(Node::Ready(value))
    }

    fn select_reviver(&self, keypath: &str, name: &str) -> Result<ReviveFn> {
        let entry = self
            .registry
            .by_name(name)
            .ok_or_else(|| TagsonError::UnregisteredType(name.to_string()))?;
        let spec = entry.spec();
        let reviver = match self.mode {
            SyncMode::Sync => {
                if spec.reviver().is_none() && spec.reviver_async().is_some() {
                    return Err(TagsonError::ModeMismatch {
                        expected: Shape::Sync,
                        found: Shape::Async,
                        keypath: keypath.to_string(),
                    });
                }
                spec.reviver()
            }
            SyncMode::Async => spec.reviver_async().or(spec.reviver()),
            SyncMode::Auto => spec.reviver().or(spec.reviver_async()),
        };
        reviver
            .cloned()
            .ok_or_else(|| TagsonError::UnregisteredType(name.to_string()))
    }

    fn place(&mut self, container: &Value, parent: &str, slot: Slot, node: Node) {
        match node {
            Node::Ready(value) => set_slot(container, &slot, value),
            Node::Reference(target) => match self.arena.get(&target) {
                Some(value) => {
                    tracing::trace!(target = %target, "back-reference resolved");
                    set_slot(container, &slot, value.clone());
                }
                None => {
                    tracing::trace!(target = %target, "back-reference queued");
                    set_slot(container, &slot, Value::Undefined);
                    self.fixups.entry(target).or_default().push(Fixup {
                        parent: parent.to_string(),
                        slot,
                    });
                }
            },
            Node::Pending(node) => {
                set_slot(container, &slot, Value::Undefined);
                self.pending.push(PendingRevival {
                    node,
                    target: Target::Slot(container.clone(), slot),
                    notify: Vec::new(),
                });
            }
        }
    }

    fn register(&mut self, keypath: &str, value: &Value) {
        self.arena.insert(keypath.to_string(), value.clone());
        if let Some(waiting) = self.fixups.remove(keypath) {
            for fixup in waiting {
                self.patch(fixup, value.clone());
            }
        }
        if let Some(slots) = self.orphans.remove(keypath) {
            for (slot, target) in slots {
                set_slot(value, &slot, target);
            }
        }
    }

    /// Write a settled reference into the final value of its parent
    fn patch(&mut self, fixup: Fixup, target: Value) {
        match self.arena.get(&fixup.parent) {
            Some(container) => set_slot(container, &fixup.slot, target),
            None => self
                .orphans
                .entry(fixup.parent)
                .or_default()
                .push((fixup.slot, target)),
        }
    }
}

fn assign(root: &mut Value, target: Target, value: Value) {
    match target {
        Target::Root => *root = value,
        Target::Slot(container, slot) => set_slot(&container, &slot, value),
    }
}

// A reviver may turn an array into an object or back
fn set_slot(container: &Value, slot: &Slot, value: Value) {
    match (container, slot) {
        (Value::Object(obj), Slot::Key(key)) => {
            obj.insert(key.clone(), value);
        }
        (Value::Object(obj), Slot::Index(index)) => {
            obj.insert(index.to_string(), value);
        }
        (Value::Array(arr), Slot::Index(index)) => arr.set(*index, value),
        (Value::Array(arr), Slot::Key(key)) => {
            if let Ok(index) = key.parse::<usize>() {
                arr.set(index, value);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeSpec;
    use serde_json::json;

    fn revive(registry: TypeRegistry, json: &Json) -> Result<Value> {
        let reviver = Reviver::new(Arc::new(registry), &ReviveOptions::default())?;
        match reviver.run(json, State::default())? {
            Outcome::Ready(value) => Ok(value),
            Outcome::Pending(_) => panic!("unexpected pending result"),
        }
    }

    #[test]
    fn untyped_documents_are_plain_copies() {
        let doc = json!({"a": [1, null], "b": "x"});
        let value = revive(TypeRegistry::new(), &doc).unwrap();
        assert_eq!(value, Value::from_json(&doc));
    }

    #[test]
    fn types_true_unwraps_reserved_root() {
        let doc = json!({"$": {"$types": 1}, "$types": true});
        let value = revive(TypeRegistry::new(), &doc).unwrap();
        assert_eq!(value, Value::from_json(&json!({"$types": 1})));
    }

    #[test]
    fn back_references_restore_cycles() {
        let doc = json!({"child": {"up": "#"}, "$types": {"child.up": "#"}});
        let value = revive(TypeRegistry::new(), &doc).unwrap();
        let up = value.get("child").and_then(|c| c.get("up")).unwrap();
        assert!(up.same_node(&value));
        assert!(value.get("$types").is_none());
    }

    #[test]
    fn references_to_typed_nodes_are_patched_when_ready() {
        let mut registry = TypeRegistry::new();
        registry
            .register((
                "boxed",
                TypeSpec::new(|_, _| false).revive(|v, _| {
                    Ok(Value::object_from([("inner", v)]))
                }),
            ))
            .unwrap();
        let doc = json!({"$": [[1], "#0"], "$types": {"$": {"0": "boxed", "1": "#"}}});
        let value = revive(registry, &doc).unwrap();
        let first = value.get("0").unwrap();
        let second = value.get("1").unwrap();
        assert!(first.same_node(&second));
        assert_eq!(first.get("inner"), Some(Value::array([1])));
    }

    #[test]
    fn references_into_typed_parents_land_on_the_revived_value() {
        let mut registry = TypeRegistry::new();
        registry
            .register(("Pair", TypeSpec::class(tagson_format::Class::new("Pair"))))
            .unwrap();

        let doc = json!({"me": "#", "$types": {"": "Pair", "me": "#"}});
        let value = revive(registry.clone(), &doc).unwrap();
        assert!(value.get("me").unwrap().same_node(&value));

        let doc = json!({"$": [{"a": "#1"}, {"k": 1}], "$types": {"$": {"0": "Pair", "0.a": "#"}}});
        let value = revive(registry, &doc).unwrap();
        let pair = value.get("0").unwrap();
        assert!(pair.as_object().and_then(|o| o.class()).is_some());
        assert!(pair.get("a").unwrap().same_node(&value.get("1").unwrap()));
    }

    #[test]
    fn forward_references_are_queued() {
        let doc = json!({"a": "#b", "b": {"x": 1}, "$types": {"a": "#"}});
        let value = revive(TypeRegistry::new(), &doc).unwrap();
        assert!(value.get("a").unwrap().same_node(&value.get("b").unwrap()));
    }

    #[test]
    fn unknown_type_is_configuration_error() {
        let doc = json!({"a": 1, "$types": {"a": "missing"}});
        let err = revive(TypeRegistry::new(), &doc).unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(err.root_cause(), TagsonError::UnregisteredType(n) if n == "missing"));
    }

    #[test]
    fn chains_apply_in_list_order() {
        let mut registry = TypeRegistry::new();
        registry
            .register(vec![
                (
                    "inc",
                    TypeSpec::new(|_, _| false)
                        .revive(|v, _| Ok(Value::Number(v.as_f64().unwrap_or_default() + 1.0))),
                ),
                (
                    "dbl",
                    TypeSpec::new(|_, _| false)
                        .revive(|v, _| Ok(Value::Number(v.as_f64().unwrap_or_default() * 2.0))),
                ),
            ])
            .unwrap();
        let doc = json!({"n": 3, "$types": {"n": ["inc", "dbl"]}});
        let value = revive(registry, &doc).unwrap();
        assert_eq!(value.get("n"), Some(Value::Number(8.0)));
    }

    #[test]
    fn sync_mode_rejects_async_only_reviver() {
        let mut registry = TypeRegistry::new();
        registry
            .register((
                "later",
                TypeSpec::new(|_, _| false)
                    .revive_async(|v, _| Ok(Value::Deferred(Deferred::resolve(v)))),
            ))
            .unwrap();
        let doc = json!({"a": 1, "$types": {"a": "later"}});
        let err = revive(registry, &doc).unwrap_err();
        assert!(err.is_mode_mismatch());
    }

    #[test]
    fn malformed_back_reference_is_rejected() {
        let doc = json!({"a": 3, "$types": {"a": "#"}});
        assert!(matches!(
            revive(TypeRegistry::new(), &doc),
            Err(TagsonError::InvalidTypeMap(_))
        ));
    }
}
