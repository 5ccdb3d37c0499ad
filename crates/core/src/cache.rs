//! Key-value cache the engine persists small settings and unsaved work into

use std::collections::HashMap;

pub const LEFT_PRESET_KEY: &str = "presets.left.id";
pub const RIGHT_PRESET_KEY: &str = "presets.right.id";
/// Stored instead of a preset id when a button has no preset on purpose
pub const UNSET_PRESET: &str = "__unset__";
pub const DRAW_OUTLINE_KEY: &str = "drawOutline";
pub const PRESETS_KEY: &str = "presets";
pub const UNSAVED_KEY: &str = "_unsaved";

/// Synchronous string store
///
/// Implementations decide how values are persisted; failures are logged by
/// the implementation and surface as a missing value.
pub trait KeyValueCache {
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value, `None` removes the key
    fn set(&mut self, key: &str, value: Option<String>);

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).as_deref() {
            Some("true") => true,
            Some("false") => false,
            _ => default,
        }
    }
}

/// In-memory cache, the default when the host supplies none
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    values: HashMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Option<String>) {
        match value {
            Some(value) => {
                self.values.insert(key.to_string(), value);
            }
            None => {
                self.values.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_remove() {
        let mut cache = MemoryCache::new();
        cache.set(DRAW_OUTLINE_KEY, Some("false".into()));
        assert_eq!(cache.get(DRAW_OUTLINE_KEY).as_deref(), Some("false"));
        assert!(!cache.get_bool(DRAW_OUTLINE_KEY, true));

        cache.set(DRAW_OUTLINE_KEY, None);
        assert!(cache.get(DRAW_OUTLINE_KEY).is_none());
        assert!(cache.get_bool(DRAW_OUTLINE_KEY, true));
    }
}
