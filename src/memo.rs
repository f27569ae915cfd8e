//! Memoization keyed on allocation identity.
//!
//! [`IdentityMemo`] caches one value per `Arc` allocation, not per key
//! value: two `Arc`s holding equal paths are different keys, while clones of
//! the same `Arc` share an entry. Entries hold only a weak reference to the
//! key, so an entry is dead once every strong reference is dropped and is
//! pruned on the next insert. There is no other eviction.
//!
//! Suited to short-lived handles a caller passes around by `Arc` (an opened
//! file, a decoded image's source path). Not a general-purpose cache.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

pub struct IdentityMemo<K: ?Sized, V> {
    entries: HashMap<usize, (Weak<K>, V)>,
}

#[inline]
fn address<K: ?Sized>(key: &Arc<K>) -> usize {
    Arc::as_ptr(key).cast::<()>() as usize
}

impl<K: ?Sized, V: Clone> IdentityMemo<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The cached value for this exact allocation, if any.
    #[must_use]
    pub fn get(&self, key: &Arc<K>) -> Option<V> {
        let (weak, value) = self.entries.get(&address(key))?;
        // Our weak reference keeps the allocation from being reused, so a
        // live entry at this address is this key.
        (weak.strong_count() > 0).then(|| value.clone())
    }

    /// Returns the cached value, computing and storing it on a miss.
    pub fn get_or_insert_with(&mut self, key: &Arc<K>, f: impl FnOnce(&K) -> V) -> V {
        match self.get_or_try_insert_with(key, |k| Ok::<_, std::convert::Infallible>(f(k))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`get_or_insert_with`](Self::get_or_insert_with) for fallible
    /// computations. Errors are not cached.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: &Arc<K>,
        f: impl FnOnce(&K) -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = f(&**key)?;
        self.prune();
        self.entries
            .insert(address(key), (Arc::downgrade(key), value.clone()));
        Ok(value)
    }

    /// Number of entries whose key is still alive.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|(weak, _)| weak.strong_count() > 0)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&mut self) {
        self.entries.retain(|_, (weak, _)| weak.strong_count() > 0);
    }
}

impl<K: ?Sized, V: Clone> Default for IdentityMemo<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::Path;

    #[test]
    fn same_allocation_hits() {
        let calls = Cell::new(0);
        let mut memo = IdentityMemo::<str, usize>::new();
        let key: Arc<str> = Arc::from("file.png");

        for _ in 0..3 {
            let value = memo.get_or_insert_with(&key, |k| {
                calls.set(calls.get() + 1);
                k.len()
            });
            assert_eq!(value, 8);
        }
        assert_eq!(calls.get(), 1);

        let clone = Arc::clone(&key);
        assert_eq!(memo.get(&clone), Some(8));
    }

    #[test]
    fn equal_values_in_different_allocations_miss() {
        let mut memo = IdentityMemo::<Path, u32>::new();
        let a: Arc<Path> = Arc::from(Path::new("a.png"));
        let b: Arc<Path> = Arc::from(Path::new("a.png"));

        memo.get_or_insert_with(&a, |_| 1);
        assert_eq!(memo.get(&b), None);
        assert_eq!(memo.get_or_insert_with(&b, |_| 2), 2);
        assert_eq!(memo.get(&a), Some(1));
        assert_eq!(memo.len(), 2);
    }

    #[test]
    fn entries_die_with_their_key() {
        let mut memo = IdentityMemo::<str, u32>::new();
        let key: Arc<str> = Arc::from("gone");
        memo.get_or_insert_with(&key, |_| 7);
        assert_eq!(memo.len(), 1);

        drop(key);
        assert!(memo.is_empty());

        let other: Arc<str> = Arc::from("other");
        memo.get_or_insert_with(&other, |_| 9);
        assert_eq!(memo.entries.len(), 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let mut memo = IdentityMemo::<str, u32>::new();
        let key: Arc<str> = Arc::from("flaky");

        let first: Result<u32, &str> = memo.get_or_try_insert_with(&key, |_| Err("boom"));
        assert_eq!(first, Err("boom"));
        assert!(memo.is_empty());

        let second: Result<u32, &str> = memo.get_or_try_insert_with(&key, |_| Ok(3));
        assert_eq!(second, Ok(3));
        assert_eq!(memo.get(&key), Some(3));
    }
}
