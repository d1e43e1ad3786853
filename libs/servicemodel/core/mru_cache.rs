//! Bounded most-recently-used map with watermark trimming.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

struct Slot<V> {
    value: V,
    stamp: u64,
}

/// What an insert displaced
pub struct Evicted<K, V> {
    /// Previous value stored under the same key
    pub replaced: Option<V>,
    /// Least-recently-used entries trimmed because the watermark was exceeded
    pub aged_out: Vec<(K, V)>,
}

impl<K, V> Evicted<K, V> {
    pub fn is_empty(&self) -> bool {
        self.replaced.is_none() && self.aged_out.is_empty()
    }
}

/// Map with O(1) lookup that remembers access order
///
/// When an insert pushes the size above the watermark, the least recently
/// used entries are trimmed until the size is at most the trim threshold
/// (4/5 of the watermark, never below 1). Trimmed entries are handed back to
/// the caller; the map never drops a value itself.
pub struct MruCache<K, V> {
    entries: HashMap<K, Slot<V>>,
    /// Recency order, oldest stamp first
    order: BTreeMap<u64, K>,
    next_stamp: u64,
    watermark: usize,
    trim_to: usize,
}

impl<K, V> MruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(watermark: usize) -> Self {
        let watermark = watermark.max(1);
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_stamp: 0,
            watermark,
            trim_to: (watermark * 4 / 5).max(1),
        }
    }

    pub fn watermark(&self) -> usize {
        self.watermark
    }

    pub fn trim_threshold(&self) -> usize {
        self.trim_to
    }

    #[inline]
    fn stamp(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    /// Look up and mark as most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let stamp = self.stamp();
        let slot = self.entries.get_mut(key)?;
        self.order.remove(&slot.stamp);
        slot.stamp = stamp;
        self.order.insert(stamp, key.clone());
        Some(&slot.value)
    }

    /// Look up without touching recency
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: K, value: V) -> Evicted<K, V> {
        let stamp = self.stamp();
        let replaced = self
            .entries
            .insert(key.clone(), Slot { value, stamp })
            .map(|old| {
                self.order.remove(&old.stamp);
                old.value
            });
        self.order.insert(stamp, key);

        let mut aged_out = Vec::new();
        if self.entries.len() > self.watermark {
            while self.entries.len() > self.trim_to {
                let Some((_, oldest)) = self.order.pop_first() else {
                    break;
                };
                if let Some(slot) = self.entries.remove(&oldest) {
                    aged_out.push((oldest, slot.value));
                }
            }
        }

        Evicted { replaced, aged_out }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.stamp);
        Some(slot.value)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys from most to least recently used
    pub fn keys_by_recency(&self) -> Vec<K> {
        self.order.values().rev().cloned().collect()
    }

    /// Remove everything, returning the entries in no particular order
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.order.clear();
        self.entries
            .drain()
            .map(|(key, slot)| (key, slot.value))
            .collect()
    }
}
