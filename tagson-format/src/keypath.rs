//! Keypath encoding
//!
//! A keypath names a node of the output tree by joining escaped property
//! names with `.`; the empty keypath is the root. Inside a segment `~` is
//! written `~0` and `.` is written `~1`, so the first `.` of a keypath is
//! always a separator.

use crate::constants::{ESCAPED_MARKER, ESCAPED_SEPARATOR, ESCAPE_MARKER, KEYPATH_SEPARATOR};
use crate::value::Value;

/// Escape a single segment
pub fn escape(segment: &str) -> String {
    // Marker first, otherwise the separator escapes would be re-escaped
    segment
        .replace(ESCAPE_MARKER, ESCAPED_MARKER)
        .replace(KEYPATH_SEPARATOR, ESCAPED_SEPARATOR)
}

/// Reverse [`escape`]
///
/// Unknown escape sequences are kept literally.
pub fn unescape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ESCAPE_MARKER {
            match chars.peek() {
                Some('0') => {
                    chars.next();
                    out.push(ESCAPE_MARKER);
                }
                Some('1') => {
                    chars.next();
                    out.push(KEYPATH_SEPARATOR);
                }
                _ => out.push(c),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Append an (unescaped) segment to a keypath
pub fn join(base: &str, segment: &str) -> String {
    if base.is_empty() {
        escape(segment)
    } else {
        let escaped = escape(segment);
        let mut out = String::with_capacity(base.len() + 1 + escaped.len());
        out.push_str(base);
        out.push(KEYPATH_SEPARATOR);
        out.push_str(&escaped);
        out
    }
}

/// Unescaped segments of a keypath; the root has none
pub fn split(keypath: &str) -> Vec<String> {
    if keypath.is_empty() {
        return Vec::new();
    }
    keypath.split(KEYPATH_SEPARATOR).map(unescape).collect()
}

/// Split off the first segment: `(unescaped head, escaped rest)`
fn split_first(keypath: &str) -> (String, Option<&str>) {
    match keypath.find(KEYPATH_SEPARATOR) {
        Some(idx) => (unescape(&keypath[..idx]), Some(&keypath[idx + 1..])),
        None => (unescape(keypath), None),
    }
}

/// Look up a keypath in a value graph
pub fn resolve(root: &Value, keypath: &str) -> Option<Value> {
    if keypath.is_empty() {
        return Some(root.clone());
    }
    let (head, rest) = split_first(keypath);
    let child = root.get(&head)?;
    match rest {
        Some(rest) => resolve(&child, rest),
        None => Some(child),
    }
}

/// Look up a keypath in a plain JSON tree
pub fn resolve_json<'a>(root: &'a serde_json::Value, keypath: &str) -> Option<&'a serde_json::Value> {
    if keypath.is_empty() {
        return Some(root);
    }
    let (head, rest) = split_first(keypath);
    let child = match root {
        serde_json::Value::Object(map) => map.get(&head)?,
        serde_json::Value::Array(items) => items.get(head.parse::<usize>().ok()?)?,
        _ => return None,
    };
    match rest {
        Some(rest) => resolve_json(child, rest),
        None => Some(child),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escape_handles_marker_and_separator() {
        assert_eq!(escape("a.b"), "a~1b");
        assert_eq!(escape("a~b"), "a~0b");
        assert_eq!(escape("~1"), "~01");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn unescape_reverses_escape() {
        for s in ["", "a.b", "~", "~0", "~1", ".~.", "~~..~1~0", "ünï.cødé"] {
            assert_eq!(unescape(&escape(s)), s);
        }
    }

    #[test]
    fn unescape_keeps_unknown_sequences() {
        assert_eq!(unescape("~2x~"), "~2x~");
    }

    #[test]
    fn join_and_split() {
        let kp = join(&join("", "a.b"), "c");
        assert_eq!(kp, "a~1b.c");
        assert_eq!(split(&kp), vec!["a.b", "c"]);
        assert!(split("").is_empty());
    }

    #[test]
    fn resolve_distinguishes_dotted_keys_from_nesting() {
        let root = Value::from_json(&json!({"a.b": 1, "a": {"b": 2}}));
        assert_eq!(resolve(&root, "a~1b"), Some(Value::Number(1.0)));
        assert_eq!(resolve(&root, "a.b"), Some(Value::Number(2.0)));
        assert_eq!(resolve(&root, "a.c"), None);
        assert_eq!(resolve(&root, "x.y"), None);
    }

    #[test]
    fn resolve_json_walks_arrays() {
        let root = json!({"list": [{"id": 1}, {"id": 2}]});
        assert_eq!(resolve_json(&root, "list.1.id"), Some(&json!(2)));
        assert_eq!(resolve_json(&root, "list.9"), None);
        assert_eq!(resolve_json(&root, ""), Some(&root));
    }
}
