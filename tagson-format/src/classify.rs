//! Value classification

use crate::constants::{BACK_REFERENCE, JSON_TYPE_NAMES, OBJECT_STRING_TAG};
use crate::value::{Class, Prototype, Value};
use std::fmt;

/// Coarse kind of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// Booleans
    Boolean,
    /// Numbers, including NaN and the infinities
    Number,
    /// Strings
    String,
    /// Arrays
    Array,
    /// Objects and deferred values
    Object,
}

impl Kind {
    /// Lowercase kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Undefined => "undefined",
            Kind::Boolean => "boolean",
            Kind::Number => "number",
            Kind::String => "string",
            Kind::Array => "array",
            Kind::Object => "object",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of `value`
pub fn kind_of(value: &Value) -> Kind {
    match value {
        Value::Undefined => Kind::Undefined,
        Value::Null => Kind::Null,
        Value::Bool(_) => Kind::Boolean,
        Value::Number(_) => Kind::Number,
        Value::String(_) => Kind::String,
        Value::Array(_) => Kind::Array,
        Value::Object(_) | Value::Deferred(_) => Kind::Object,
    }
}

/// Kind name of a plain JSON value
pub fn json_type_of(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Object whose prototype is the bare object root or absent
pub fn is_plain_object(value: &Value) -> bool {
    match value {
        Value::Object(obj) => matches!(obj.prototype(), Prototype::None | Prototype::Object),
        _ => false,
    }
}

/// Plain object, or a class instance tagged `Object`
///
/// Exotic host shapes (`Date`, `Map`, …) are not user objects.
pub fn is_user_object(value: &Value) -> bool {
    match value {
        Value::Object(obj) => match obj.prototype() {
            Prototype::None | Prototype::Object => true,
            Prototype::Class(class) => class.string_tag() == OBJECT_STRING_TAG,
        },
        _ => false,
    }
}

/// Whether `value` is an instance of `class`
///
/// Compares signatures, so a descriptor created by another copy of the
/// defining code still matches.
pub fn same_constructor(value: &Value, class: &Class) -> bool {
    match value {
        Value::Object(obj) => obj
            .class()
            .map_or(false, |own| own.signature() == class.signature()),
        _ => false,
    }
}

/// Whether `value` is an instance of `class` or of a subclass of it
pub fn is_instance_of(value: &Value, class: &Class) -> bool {
    let Value::Object(obj) = value else {
        return false;
    };
    let mut current = obj.class();
    while let Some(cls) = current {
        if cls.signature() == class.signature() {
            return true;
        }
        current = cls.parent().cloned();
    }
    false
}

/// NaN or an infinity
pub fn is_special_number(n: f64) -> bool {
    !n.is_finite()
}

/// Names that may never be registered as type names
pub fn is_reserved_type_name(name: &str) -> bool {
    name == BACK_REFERENCE || JSON_TYPE_NAMES.contains(&name)
}
