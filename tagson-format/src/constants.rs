//! Reserved names and markers for the Tagson format

/// Root property holding the wrapped data tree when packaging is required.
pub const DATA_MARKER: &str = "$";

/// Root property holding the type map side channel.
pub const TYPES_MARKER: &str = "$types";

/// Type map value marking a node as a back-reference to an earlier keypath.
///
/// The same character prefixes the emitted back-reference string.
pub const BACK_REFERENCE: &str = "#";

/// Separator between escaped keypath segments.
pub const KEYPATH_SEPARATOR: char = '.';

/// Escape marker used inside keypath segments.
pub const ESCAPE_MARKER: char = '~';

/// Escape sequence standing for a literal escape marker.
pub const ESCAPED_MARKER: &str = "~0";

/// Escape sequence standing for a literal separator.
pub const ESCAPED_SEPARATOR: &str = "~1";

/// Names of the plain JSON kinds; none of them may be registered as a type.
pub const JSON_TYPE_NAMES: [&str; 6] = ["null", "boolean", "number", "string", "array", "object"];

/// String tag carried by ordinary (non-exotic) objects.
pub const OBJECT_STRING_TAG: &str = "Object";

/// Identity tag stamped on every deferred value.
///
/// Compared by value so deferreds built by another copy of this crate are
/// still recognised.
pub const DEFERRED_TAG: &str = "tagson.deferred/1";

/// Array property written when a node asks for an explicit length marker.
pub const LENGTH_KEY: &str = "length";
