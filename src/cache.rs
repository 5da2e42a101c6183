use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::hash::Hash;
use std::sync::Arc;

/// Process-wide read-through memo holding at most `capacity` keys. Values are
/// computed synchronously under the shard lock of their key. Once full, new
/// keys are computed on every call and not stored; nothing is evicted.
#[derive(Clone)]
pub struct MemoCache<K, V> {
    inner: Arc<DashMap<K, V>>,
    capacity: usize,
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            capacity,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    pub fn get_or_insert_with<F>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(hit) = self.inner.get(&key) {
            return hit.value().clone();
        }
        if self.inner.len() >= self.capacity {
            return compute();
        }
        match self.inner.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => entry.insert(compute()).value().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
