//! Per-attempt scratch space shared between stages.
//!
//! A `CycleState` is created for each scheduling attempt and dropped when
//! the attempt ends. Plugins use it to hand derived data to later stages,
//! e.g. a PreScore result consumed by the same plugin's Score.

use std::any::Any;
use std::collections::HashMap;

/// Typed key-value store scoped to a single scheduling attempt.
#[derive(Default)]
pub struct CycleState {
    storage: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn write<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.storage.insert(key.into(), Box::new(value));
    }

    /// Read a value back. Returns `None` if the key is missing or holds a
    /// different type.
    pub fn read<T: Any>(&self, key: &str) -> Option<&T> {
        self.storage.get(key)?.downcast_ref::<T>()
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.storage.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

impl std::fmt::Debug for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.storage.keys().collect();
        keys.sort();
        f.debug_struct("CycleState").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Suffix(u32);

    #[test]
    fn write_then_read() {
        let mut state = CycleState::new();
        state.write("PreScoreNodeNumber", Suffix(3));

        assert_eq!(state.read::<Suffix>("PreScoreNodeNumber"), Some(&Suffix(3)));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn read_with_wrong_type_is_none() {
        let mut state = CycleState::new();
        state.write("k", 5u64);
        assert!(state.read::<String>("k").is_none());
        assert_eq!(state.read::<u64>("k"), Some(&5));
    }

    #[test]
    fn missing_key_is_none() {
        let state = CycleState::new();
        assert!(state.read::<u64>("nope").is_none());
        assert!(state.is_empty());
    }

    #[test]
    fn write_replaces_and_delete_removes() {
        let mut state = CycleState::new();
        state.write("k", 1u8);
        state.write("k", 2u8);
        assert_eq!(state.read::<u8>("k"), Some(&2));

        assert!(state.delete("k"));
        assert!(!state.delete("k"));
        assert!(state.is_empty());
    }
}
