//! Walk state visible to test, replace and revive functions

use serde::Deserialize;
use serde_json::Map;

/// How a container's children are iterated and emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterateIn {
    /// Emit an array, visiting numeric slots
    Array,
    /// Emit an object keyed by property name (arrays become index-keyed maps)
    Object,
}

/// Position of a child within its output container
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot {
    Key(String),
    Index(usize),
}

/// Per-node flags
///
/// Saved and cleared before each child is visited, restored afterwards, so a
/// flag set while handling one node never leaks into its children.
#[derive(Debug, Clone, Default)]
pub struct NodeFlags {
    /// Iteration mode requested for the current container
    pub iterate_in: Option<IterateIn>,
    /// Visit unset array slots as `undefined`
    pub iterate_unset_numeric: bool,
    /// Emit an explicit `length` property when iterating an array as an object
    pub add_length: bool,
    /// Whether the current node is an own property of its parent
    pub own_keys: bool,
    /// Type detected for the current node
    pub type_name: Option<String>,
    /// The current node is the output of a replacement
    pub replaced: bool,
    pub(crate) chain_len: usize,
    pub(crate) replaced_source: Option<usize>,
}

/// Mutable state threaded through one encapsulate or revive call
#[derive(Debug, Clone, Default)]
pub struct State {
    /// Flags of the node being processed
    pub flags: NodeFlags,
    /// Free-form caller state
    pub user: Map<String, serde_json::Value>,
    keypath: String,
}

impl State {
    /// State seeded with caller data
    pub fn with_user(user: Map<String, serde_json::Value>) -> Self {
        Self {
            user,
            ..Self::default()
        }
    }

    /// Keypath of the node being processed
    pub fn keypath(&self) -> &str {
        &self.keypath
    }

    pub(crate) fn set_keypath(&mut self, keypath: &str) {
        if self.keypath != keypath {
            self.keypath.clear();
            self.keypath.push_str(keypath);
        }
    }

    /// Clear the node flags for a child, returning the parent's
    pub(crate) fn enter_child(&mut self, own_keys: bool) -> NodeFlags {
        std::mem::replace(
            &mut self.flags,
            NodeFlags {
                own_keys,
                ..NodeFlags::default()
            },
        )
    }

    /// Restore the parent's flags
    pub(crate) fn leave_child(&mut self, saved: NodeFlags) {
        self.flags = saved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_flags_start_clean_and_restore() {
        let mut state = State::default();
        state.flags.iterate_in = Some(IterateIn::Object);
        state.flags.type_name = Some("sparse".into());

        let saved = state.enter_child(true);
        assert!(state.flags.iterate_in.is_none());
        assert!(state.flags.own_keys);
        state.flags.add_length = true;

        state.leave_child(saved);
        assert_eq!(state.flags.iterate_in, Some(IterateIn::Object));
        assert!(!state.flags.add_length);
        assert_eq!(state.flags.type_name.as_deref(), Some("sparse"));
    }

    #[test]
    fn user_state_survives_child_visits() {
        let mut user = Map::new();
        user.insert("count".into(), 1.into());
        let mut state = State::with_user(user);
        let saved = state.enter_child(true);
        state.user.insert("count".into(), 2.into());
        state.leave_child(saved);
        assert_eq!(state.user["count"], 2);
    }
}
