use core::borrow::Borrow;
use core::hash::Hash;
use std::collections::HashMap;

use crate::lock::RwLock;

/// A key/value store shared between concurrent reconcilers.
///
/// Lookups return clones of the stored value, so no lock outlives a call.
/// A missing key is `None`; a stored value that is itself empty (for example
/// `Some(None)` when `V` is an `Option`) stays distinguishable from absence.
///
/// # Example
/// ```
/// use podsim::SharedCache;
///
/// let cache: SharedCache<String, Option<u32>> = SharedCache::new();
/// cache.set("known-empty".to_owned(), None);
///
/// assert_eq!(cache.get("missing"), None);
/// assert_eq!(cache.get("known-empty"), Some(None));
/// ```
#[derive(Debug)]
pub struct SharedCache<K = String, V = serde_json::Value> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for SharedCache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> SharedCache<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, returning the value it replaced.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        self.entries.write().insert(key, value)
    }

    /// Removes `key`, returning its value if it was present.
    pub fn unset<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.write().remove(key)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        V: Clone,
    {
        self.entries.read().get(key).cloned()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.read().contains_key(key)
    }

    /// Returns the value under `key`, storing `make()` first if it is absent.
    ///
    /// `make` runs under the write lock and must not touch this cache.
    pub fn get_or_insert_with<F>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> V,
        V: Clone,
    {
        if let Some(value) = self.entries.read().get(&key) {
            return value.clone();
        }
        self.entries.write().entry(key).or_insert_with(make).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
