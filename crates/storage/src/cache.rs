use octastore_common::OctreeNode;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

const NIL: usize = usize::MAX;

struct Slot<K, V> {
    entry: Option<(K, V)>,
    prev: usize,
    next: usize,
}

/// Bounded map that evicts the least recently used entry.
///
/// Entries live in a slab threaded by a doubly-linked recency list, so a hit,
/// an insert and an eviction are all O(1). The head is the most recent entry.
pub struct LruCache<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Slot<K, V>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    capacity: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// A capacity of 0 stores nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Look up an entry and mark it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.promote(idx);
        self.slots[idx].entry.as_ref().map(|(_, value)| value)
    }

    /// Insert or replace an entry as most recently used. Returns the entry
    /// evicted to make room, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.capacity == 0 {
            return None;
        }
        if let Some(&idx) = self.map.get(&key) {
            self.slots[idx].entry = Some((key, value));
            self.promote(idx);
            return None;
        }

        let evicted = if self.map.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        let slot = Slot {
            entry: Some((key.clone(), value)),
            prev: NIL,
            next: NIL,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                idx
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        self.map.insert(key, idx);
        self.attach_front(idx);
        evicted
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.map.remove(key)?;
        self.detach(idx);
        self.free.push(idx);
        self.slots[idx].entry.take().map(|(_, value)| value)
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.slots.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<&K> {
        let mut keys = Vec::with_capacity(self.map.len());
        let mut idx = self.head;
        while idx != NIL {
            let slot = &self.slots[idx];
            if let Some((key, _)) = &slot.entry {
                keys.push(key);
            }
            idx = slot.next;
        }
        keys
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        let idx = self.tail;
        if idx == NIL {
            return None;
        }
        self.detach(idx);
        self.free.push(idx);
        let (key, value) = self.slots[idx].entry.take()?;
        self.map.remove(&key);
        Some((key, value))
    }

    fn promote(&mut self, idx: usize) {
        if idx != self.head {
            self.detach(idx);
            self.attach_front(idx);
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next].prev = prev;
        }
        self.slots[idx].prev = NIL;
        self.slots[idx].next = NIL;
    }

    fn attach_front(&mut self, idx: usize) {
        self.slots[idx].prev = NIL;
        self.slots[idx].next = self.head;
        if self.head == NIL {
            self.tail = idx;
        } else {
            self.slots[self.head].prev = idx;
        }
        self.head = idx;
    }
}

/// Accelerator of node copies in front of the primary map.
///
/// One coarse lock covers lookup, victim selection, removal and insert, so two
/// writers never evict each other's fresh entries.
pub(crate) struct NodeCache {
    inner: Option<Mutex<LruCache<String, OctreeNode>>>,
}

impl NodeCache {
    pub(crate) fn new(capacity: usize, enabled: bool) -> Self {
        let inner = (enabled && capacity > 0).then(|| Mutex::new(LruCache::new(capacity)));
        Self { inner }
    }

    pub(crate) fn get(&self, key: &str) -> Option<OctreeNode> {
        self.inner.as_ref()?.lock().get(key).cloned()
    }

    pub(crate) fn promote(&self, key: String, node: OctreeNode) {
        let Some(inner) = &self.inner else {
            return;
        };
        if let Some((evicted, _)) = inner.lock().insert(key, node) {
            tracing::trace!(key = %evicted, "evicted cache entry");
        }
    }

    pub(crate) fn invalidate(&self, keys: &[String]) {
        if let Some(inner) = &self.inner {
            let mut cache = inner.lock();
            for key in keys {
                cache.remove(key.as_str());
            }
        }
    }

    pub(crate) fn clear(&self) {
        if let Some(inner) = &self.inner {
            inner.lock().clear();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.lock().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get("a"), Some(&1)); // b is now oldest
        let evicted = cache.insert("c", 3);
        assert_eq!(evicted, Some(("b", 2)));
        assert!(cache.contains("a"));
        assert!(cache.contains("c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn insert_existing_key_replaces_without_eviction() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.insert("a", 10), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.keys_by_recency(), vec![&"a", &"b"]);
        assert_eq!(cache.get("a"), Some(&10));
    }

    #[test]
    fn remove_and_reuse_slots() {
        let mut cache = LruCache::new(3);
        cache.insert(1, "one");
        cache.insert(2, "two");
        cache.insert(3, "three");
        assert_eq!(cache.remove(&2), Some("two"));
        assert_eq!(cache.remove(&2), None);
        assert_eq!(cache.keys_by_recency(), vec![&3, &1]);

        cache.insert(4, "four");
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.keys_by_recency(), vec![&4, &3, &1]);
        assert_eq!(cache.insert(5, "five"), Some((1, "one")));
    }

    #[test]
    fn recency_order_tracks_hits() {
        let mut cache = LruCache::new(4);
        for key in 0..4 {
            cache.insert(key, key * 10);
        }
        cache.get(&0);
        cache.get(&2);
        assert_eq!(cache.keys_by_recency(), vec![&2, &0, &3, &1]);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut cache = LruCache::new(0);
        assert_eq!(cache.insert("a", 1), None);
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn clear_empties_everything() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.keys_by_recency().is_empty());
        cache.insert("c", 3);
        assert_eq!(cache.keys_by_recency(), vec![&"c"]);
    }

    #[test]
    fn string_keys_look_up_by_str() {
        let mut cache: LruCache<String, u32> = LruCache::new(1);
        cache.insert("octree:05:0000000000000001".to_string(), 7);
        assert_eq!(cache.get("octree:05:0000000000000001"), Some(&7));
        assert_eq!(cache.capacity(), 1);
    }
}
