//! Value graph model
//!
//! Containers are shared and interior-mutable so a graph may contain shared
//! references and cycles. Identity of a container is the address of its
//! allocation; two handles to the same container compare as the same node.

use crate::deferred::Deferred;
use indexmap::IndexMap;
use std::any::Any;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Descriptor of a user or host class
///
/// Classes are matched by [`Class::signature`], a stable structural string,
/// rather than by pointer, so independently created descriptors for the same
/// class are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    name: String,
    signature: String,
    string_tag: String,
    parent: Option<Arc<Class>>,
}

impl Class {
    /// Ordinary class whose instances serialize like plain objects
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            signature: format!("class {}", name),
            string_tag: crate::constants::OBJECT_STRING_TAG.to_string(),
            name,
            parent: None,
        }
    }

    /// Host class with its own string tag (e.g. `Date`, `Map`)
    ///
    /// Instances are not user objects and need a registered type to be encoded.
    pub fn exotic(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            signature: format!("class {}", name),
            string_tag: name.clone(),
            name,
            parent: None,
        }
    }

    /// Override the structural signature
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Derive from `parent`, inheriting its string tag
    pub fn extends(mut self, parent: Arc<Class>) -> Self {
        self.string_tag = parent.string_tag.clone();
        self.parent = Some(parent);
        self
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Structural signature used for cross-copy comparison
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// String tag (`Object` for ordinary classes)
    pub fn string_tag(&self) -> &str {
        &self.string_tag
    }

    /// Parent class, if any
    pub fn parent(&self) -> Option<&Arc<Class>> {
        self.parent.as_ref()
    }
}

/// Prototype of an object
#[derive(Debug, Clone)]
pub enum Prototype {
    /// No prototype at all
    None,
    /// The bare object root
    Object,
    /// An instance of a class
    Class(Arc<Class>),
}

/// Backing storage of an object
pub struct ObjectData {
    prototype: Prototype,
    props: IndexMap<String, Value>,
    native: Option<Rc<dyn Any>>,
}

/// Shared handle to an object
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<ObjectData>>);

impl ObjectRef {
    /// New plain object
    pub fn new() -> Self {
        Self::with_prototype(Prototype::Object)
    }

    /// New object with the given prototype
    pub fn with_prototype(prototype: Prototype) -> Self {
        ObjectRef(Rc::new(RefCell::new(ObjectData {
            prototype,
            props: IndexMap::new(),
            native: None,
        })))
    }

    /// New instance of `class`
    pub fn instance_of(class: Arc<Class>) -> Self {
        Self::with_prototype(Prototype::Class(class))
    }

    /// Prototype of this object
    pub fn prototype(&self) -> Prototype {
        self.0.borrow().prototype.clone()
    }

    /// Class of this object, if it is a class instance
    pub fn class(&self) -> Option<Arc<Class>> {
        match &self.0.borrow().prototype {
            Prototype::Class(class) => Some(class.clone()),
            _ => None,
        }
    }

    /// Property value
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().props.get(key).cloned()
    }

    /// Set a property, returning the previous value
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.borrow_mut().props.insert(key.into(), value.into())
    }

    /// Remove a property, preserving the order of the others
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().props.shift_remove(key)
    }

    /// Whether the property exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().props.contains_key(key)
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.0.borrow().props.len()
    }

    /// Whether the object has no properties
    pub fn is_empty(&self) -> bool {
        self.0.borrow().props.is_empty()
    }

    /// Property names in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().props.keys().cloned().collect()
    }

    /// Snapshot of the properties in insertion order
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .props
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Borrow the property table
    pub fn props(&self) -> Ref<'_, IndexMap<String, Value>> {
        Ref::map(self.0.borrow(), |data| &data.props)
    }

    /// Attach an opaque host payload
    pub fn set_native<T: Any>(&self, payload: T) {
        self.0.borrow_mut().native = Some(Rc::new(payload));
    }

    /// Host payload downcast to `T`
    pub fn native<T: Any>(&self) -> Option<Rc<T>> {
        let native = self.0.borrow().native.clone()?;
        native.downcast::<T>().ok()
    }

    /// Whether both handles point to the same object
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity of this object
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to an array; `None` slots are unset ("holes")
#[derive(Clone)]
pub struct ArrayRef(Rc<RefCell<Vec<Option<Value>>>>);

impl ArrayRef {
    /// New empty array
    pub fn new() -> Self {
        ArrayRef(Rc::new(RefCell::new(Vec::new())))
    }

    /// New array of `len` unset slots
    pub fn with_len(len: usize) -> Self {
        ArrayRef(Rc::new(RefCell::new(vec![None; len])))
    }

    /// New dense array
    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        ArrayRef(Rc::new(RefCell::new(
            values.into_iter().map(|v| Some(v.into())).collect(),
        )))
    }

    /// Length including unset slots
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Whether the array has length zero
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Value at `index`; `None` for unset or out of range slots
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned().flatten()
    }

    /// Whether slot `index` holds a value
    pub fn is_set(&self, index: usize) -> bool {
        matches!(self.0.borrow().get(index), Some(Some(_)))
    }

    /// Set slot `index`, growing the array with unset slots as needed
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let mut slots = self.0.borrow_mut();
        if index >= slots.len() {
            slots.resize(index + 1, None);
        }
        slots[index] = Some(value.into());
    }

    /// Clear slot `index`, leaving a hole
    pub fn unset(&self, index: usize) {
        if let Some(slot) = self.0.borrow_mut().get_mut(index) {
            *slot = None;
        }
    }

    /// Append a value
    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(Some(value.into()));
    }

    /// Snapshot of all slots
    pub fn slots(&self) -> Vec<Option<Value>> {
        self.0.borrow().clone()
    }

    /// Snapshot of the set values, skipping holes
    pub fn values(&self) -> Vec<Value> {
        self.0.borrow().iter().flatten().cloned().collect()
    }

    /// Whether both handles point to the same array
    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity of this array
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl Default for ArrayRef {
    fn default() -> Self {
        Self::new()
    }
}

/// A node of a value graph
#[derive(Clone)]
pub enum Value {
    /// Absent value
    Undefined,
    /// JSON null
    Null,
    /// Boolean
    Bool(bool),
    /// IEEE double, including NaN and the infinities
    Number(f64),
    /// String
    String(String),
    /// Shared array
    Array(ArrayRef),
    /// Shared object
    Object(ObjectRef),
    /// Value not yet available
    Deferred(Deferred),
}

impl Value {
    /// New empty plain object
    pub fn object() -> Self {
        Value::Object(ObjectRef::new())
    }

    /// New plain object from key/value pairs
    pub fn object_from<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let obj = ObjectRef::new();
        for (k, v) in entries {
            obj.insert(k, v);
        }
        Value::Object(obj)
    }

    /// New dense array
    pub fn array<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::Array(ArrayRef::from_values(values))
    }

    /// Deep copy of a JSON value into fresh containers
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(ArrayRef::from_values(items.iter().map(Value::from_json)))
            }
            serde_json::Value::Object(map) => {
                let obj = ObjectRef::new();
                for (k, v) in map {
                    obj.insert(k.clone(), Value::from_json(v));
                }
                Value::Object(obj)
            }
        }
    }

    /// Identity of a container or deferred value
    pub fn addr(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(a.addr()),
            Value::Object(o) => Some(o.addr()),
            Value::Deferred(d) => Some(d.addr()),
            _ => None,
        }
    }

    /// Whether both values are the same node (identity for containers)
    pub fn same_node(&self, other: &Value) -> bool {
        match (self.addr(), other.addr()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// True for `Undefined`
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// True for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// String content
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean content
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Array handle
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Object handle
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Deferred handle
    pub fn as_deferred(&self) -> Option<&Deferred> {
        match self {
            Value::Deferred(d) => Some(d),
            _ => None,
        }
    }

    /// Property or index lookup on a container
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(o) => o.get(key),
            Value::Array(a) => key.parse::<usize>().ok().and_then(|i| a.get(i)),
            _ => None,
        }
    }

    /// Structural equality that follows cycles
    ///
    /// Containers are equal when their shapes, prototypes and contents are
    /// equal; a pair of containers already under comparison is assumed equal.
    /// Deferred values are equal only when they are the same node.
    pub fn deep_eq(&self, other: &Value) -> bool {
        let mut seen = Vec::new();
        deep_eq_inner(self, other, &mut seen)
    }
}

fn deep_eq_inner(a: &Value, b: &Value, seen: &mut Vec<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Deferred(x), Value::Deferred(y)) => x.addr() == y.addr(),
        (Value::Array(x), Value::Array(y)) => {
            let pair = (x.addr(), y.addr());
            if seen.contains(&pair) {
                return true;
            }
            seen.push(pair);
            let (xs, ys) = (x.slots(), y.slots());
            xs.len() == ys.len()
                && xs.iter().zip(ys.iter()).all(|(p, q)| match (p, q) {
                    (None, None) => true,
                    (Some(p), Some(q)) => deep_eq_inner(p, q, seen),
                    _ => false,
                })
        }
        (Value::Object(x), Value::Object(y)) => {
            let pair = (x.addr(), y.addr());
            if seen.contains(&pair) {
                return true;
            }
            seen.push(pair);
            let same_proto = match (x.prototype(), y.prototype()) {
                (Prototype::Class(p), Prototype::Class(q)) => p.signature() == q.signature(),
                (Prototype::Class(_), _) | (_, Prototype::Class(_)) => false,
                _ => true,
            };
            let (xs, ys) = (x.entries(), y.entries());
            same_proto
                && xs.len() == ys.len()
                && xs.iter().all(|(k, v)| {
                    ys.iter()
                        .find(|(k2, _)| k2 == k)
                        .map_or(false, |(_, v2)| deep_eq_inner(v, v2, seen))
                })
        }
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.deep_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = Vec::new();
        fmt_value(self, f, &mut stack)
    }
}

fn fmt_value(value: &Value, f: &mut fmt::Formatter<'_>, stack: &mut Vec<usize>) -> fmt::Result {
    match value {
        Value::Undefined => f.write_str("undefined"),
        Value::Null => f.write_str("null"),
        Value::Bool(b) => write!(f, "{}", b),
        Value::Number(n) => write!(f, "{}", n),
        Value::String(s) => write!(f, "{:?}", s),
        Value::Deferred(d) => write!(f, "{:?}", d),
        Value::Array(a) => {
            if stack.contains(&a.addr()) {
                return f.write_str("[<cycle>]");
            }
            stack.push(a.addr());
            f.write_str("[")?;
            for (i, slot) in a.slots().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                match slot {
                    Some(v) => fmt_value(v, f, stack)?,
                    None => f.write_str("<hole>")?,
                }
            }
            stack.pop();
            f.write_str("]")
        }
        Value::Object(o) => {
            if stack.contains(&o.addr()) {
                return f.write_str("{<cycle>}");
            }
            stack.push(o.addr());
            if let Some(class) = o.class() {
                write!(f, "{} ", class.name())?;
            }
            f.write_str("{")?;
            for (i, (k, v)) in o.entries().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{:?}: ", k)?;
                fmt_value(v, f, stack)?;
            }
            stack.pop();
            f.write_str("}")
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::Object(self.clone()), f)
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::Array(self.clone()), f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ArrayRef> for Value {
    fn from(a: ArrayRef) -> Self {
        Value::Array(a)
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

impl From<Deferred> for Value {
    fn from(d: Deferred) -> Self {
        Value::Deferred(d)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shared_handles_share_identity() {
        let obj = ObjectRef::new();
        let a = Value::Object(obj.clone());
        let b = Value::Object(obj);
        assert!(a.same_node(&b));
        assert!(!a.same_node(&Value::object()));
    }

    #[test]
    fn array_set_grows_with_holes() {
        let arr = ArrayRef::new();
        arr.set(3, "x");
        assert_eq!(arr.len(), 4);
        assert!(!arr.is_set(1));
        assert!(arr.is_set(3));
        assert_eq!(arr.values().len(), 1);
    }

    #[test]
    fn deep_eq_follows_cycles() {
        let a = ObjectRef::new();
        a.insert("self", a.clone());
        let b = ObjectRef::new();
        b.insert("self", b.clone());
        assert_eq!(Value::Object(a), Value::Object(b));
    }

    #[test]
    fn deep_eq_distinguishes_classes() {
        let point = Arc::new(Class::new("Point"));
        let inst = ObjectRef::instance_of(point);
        inst.insert("x", 1);
        let plain = Value::object_from([("x", 1)]);
        assert_ne!(Value::Object(inst), plain);
    }

    #[test]
    fn from_json_builds_fresh_containers() {
        let v = Value::from_json(&json!({"a": [1, true, null], "b": "s"}));
        let obj = v.as_object().unwrap();
        assert_eq!(obj.keys(), vec!["a", "b"]);
        assert_eq!(v.get("a").unwrap().get("0"), Some(Value::Number(1.0)));
    }

    #[test]
    fn native_payload_downcasts() {
        let date = ObjectRef::instance_of(Arc::new(Class::exotic("Date")));
        date.set_native(1_700_000_000_000.0f64);
        assert_eq!(*date.native::<f64>().unwrap(), 1_700_000_000_000.0);
        assert!(date.native::<String>().is_none());
    }

    #[test]
    fn debug_marks_cycles() {
        let a = ArrayRef::new();
        a.push(a.clone());
        assert_eq!(format!("{:?}", Value::Array(a)), "[[<cycle>]]");
    }
}
