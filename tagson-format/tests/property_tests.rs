//! Property-based tests for Tagson format primitives

use proptest::prelude::*;
use tagson_format::keypath::{escape, join, resolve, split, unescape};
use tagson_format::Value;

fn segment() -> impl Strategy<Value = String> {
    // Bias towards the characters that need escaping
    prop::collection::vec(
        prop_oneof![
            Just('.'),
            Just('~'),
            Just('0'),
            Just('1'),
            any::<char>(),
        ],
        0..12,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    #[test]
    fn escape_roundtrip_property(s in segment()) {
        prop_assert_eq!(unescape(&escape(&s)), s);
    }

    #[test]
    fn escaped_segments_never_contain_separator(s in segment()) {
        prop_assert!(!escape(&s).contains('.'));
    }

    #[test]
    fn join_split_roundtrip_property(segments in prop::collection::vec(segment(), 1..6)) {
        // A leading empty segment is indistinguishable from the root
        prop_assume!(!segments[0].is_empty());
        let keypath = segments.iter().fold(String::new(), |kp, s| join(&kp, s));
        prop_assert_eq!(split(&keypath), segments);
    }

    #[test]
    fn resolve_finds_nested_leaf(segments in prop::collection::vec(segment(), 1..5)) {
        prop_assume!(!segments[0].is_empty());
        let leaf = Value::from("leaf");
        let mut node = leaf.clone();
        for s in segments.iter().rev() {
            node = Value::object_from([(s.clone(), node)]);
        }
        let keypath = segments.iter().fold(String::new(), |kp, s| join(&kp, s));
        prop_assert_eq!(resolve(&node, &keypath), Some(leaf));
    }
}
