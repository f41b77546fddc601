//! # Key → owner map.
//!
//! ## Rules
//! - At most one [`TaskHandle`] per key.
//! - `swap` is the only way in; it returns the displaced owner so the caller
//!   can cancel and await it.
//! - An owner removes itself only through `remove_if_current`, which is a
//!   no-op once a newer owner has taken the key.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use crate::sync::lock;

use super::handle::TaskHandle;

pub(crate) struct Registry<K> {
    owners: Mutex<HashMap<K, TaskHandle>>,
}

impl<K: Hash + Eq + Clone> Registry<K> {
    pub(crate) fn new() -> Self {
        Self {
            owners: Mutex::new(HashMap::new()),
        }
    }

    /// Installs `handle` as the owner of `key`, returning the previous owner.
    pub(crate) fn swap(&self, key: K, handle: TaskHandle) -> Option<TaskHandle> {
        lock(&self.owners).insert(key, handle)
    }

    /// Removes the entry for `key` if it still belongs to task `id`.
    pub(crate) fn remove_if_current(&self, key: &K, id: u64) -> bool {
        let mut owners = lock(&self.owners);
        match owners.get(key) {
            Some(current) if current.id() == id => {
                owners.remove(key);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<TaskHandle> {
        lock(&self.owners).get(key).cloned()
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        lock(&self.owners).contains_key(key)
    }

    pub(crate) fn keys(&self) -> Vec<K> {
        lock(&self.owners).keys().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.owners).len()
    }

    /// Current owners; entries stay registered until their tasks finish.
    pub(crate) fn snapshot(&self) -> Vec<(K, TaskHandle)> {
        lock(&self.owners)
            .iter()
            .map(|(k, h)| (k.clone(), h.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_owner_cannot_remove_successor() {
        let reg = Registry::new();
        let first = TaskHandle::new(1);
        let second = TaskHandle::new(2);

        assert!(reg.swap("k", first).is_none());
        let displaced = reg.swap("k", second).map(|h| h.id());
        assert_eq!(displaced, Some(1));

        assert!(!reg.remove_if_current(&"k", 1));
        assert_eq!(reg.get(&"k").map(|h| h.id()), Some(2));

        assert!(reg.remove_if_current(&"k", 2));
        assert!(!reg.contains(&"k"));
    }

    #[test]
    fn test_keys_and_len() {
        let reg = Registry::new();
        reg.swap("a", TaskHandle::new(1));
        reg.swap("b", TaskHandle::new(2));
        let mut keys = reg.keys();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.snapshot().len(), 2);
    }
}
