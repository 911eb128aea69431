use core::hash::Hash;
use std::collections::HashSet;

use crate::lock::RwLock;

/// A set of identifiers shared between concurrent reconcilers.
///
/// Reads ([`has`](Self::has), [`size`](Self::size),
/// [`for_each`](Self::for_each)) share a read lock; writes take it
/// exclusively. Entries have no ordering and never expire.
///
/// # Example
/// ```
/// use podsim::ConcurrentSet;
///
/// let nodes = ConcurrentSet::new();
/// nodes.put("node-0".to_owned());
/// assert!(nodes.has("node-0"));
/// assert_eq!(nodes.size(), 1);
/// ```
#[derive(Debug)]
pub struct ConcurrentSet<T = String> {
    entries: RwLock<HashSet<T>>,
}

impl<T> Default for ConcurrentSet<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashSet::new()),
        }
    }
}

impl<T> ConcurrentSet<T>
where
    T: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value`, returning `true` if it was not present.
    pub fn put(&self, value: T) -> bool {
        self.entries.write().insert(value)
    }

    /// Removes `value`, returning `true` if it was present.
    pub fn delete<Q>(&self, value: &Q) -> bool
    where
        T: core::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.write().remove(value)
    }

    pub fn has<Q>(&self, value: &Q) -> bool
    where
        T: core::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.read().contains(value)
    }

    pub fn size(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Visits every entry while holding the read lock.
    ///
    /// Writers are held off for the duration, so `visit` sees a consistent
    /// view. `visit` must not touch this set at all. A write deadlocks
    /// outright, and a nested read deadlocks as soon as a writer is queued,
    /// since queued writers block new readers. Use
    /// [`snapshot`](Self::snapshot) to iterate while calling back into the
    /// set.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&T),
    {
        let entries = self.entries.read();
        for entry in entries.iter() {
            visit(entry);
        }
    }

    /// Copies the current entries out, so the caller can iterate and mutate
    /// the set freely.
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.entries.read().iter().cloned().collect()
    }
}

impl<T> FromIterator<T> for ConcurrentSet<T>
where
    T: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            entries: RwLock::new(iter.into_iter().collect()),
        }
    }
}
