//! Arena-backed LRU cache.
//!
//! Entries live in `Vec` slots and are chained into a recency sequence by
//! index (`head` = most recent, `tail` = least recent). A slot keeps its
//! index for the life of its entry; vacated slots go on a free list and are
//! reused by the next insert. Every operation stays O(1) without aliased
//! pointers.

use crate::cache::entry::CacheEntry;
use crate::error::{CoordinationError, Result};
use crate::stats::percentage;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use tracing::debug;

/// Snapshot of cache counters (`threadCache` in the stats schema).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: String,
    pub utilization_rate: String,
}

#[derive(Debug)]
pub struct ReplacementCache<K, V> {
    slots: Vec<Option<CacheEntry<K, V>>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl<K, V> ReplacementCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CoordinationError::InvalidCapacity {
                component: "replacement cache",
            });
        }
        Ok(Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            index: HashMap::with_capacity(capacity),
            head: None,
            tail: None,
            capacity,
            hits: 0,
            misses: 0,
        })
    }

    /// Look up `key`, marking it most-recently-used on a hit.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.index.get(key).copied() {
            Some(slot) => {
                self.hits += 1;
                self.touch(slot);
                self.slot(slot).map(|e| &e.value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Read without touching recency or the hit/miss counters.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entry(key).map(|e| &e.value)
    }

    pub fn entry<Q>(&self, key: &Q) -> Option<&CacheEntry<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.slot(*self.index.get(key)?)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Insert or update `key`. Returns the evicted (key, value) when a new
    /// key pushed the cache past capacity.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&slot) = self.index.get(&key) {
            if let Some(entry) = self.slot_mut(slot) {
                entry.value = value;
            }
            self.touch(slot);
            return None;
        }

        let evicted = if self.index.len() >= self.capacity {
            let evicted = self.pop_lru();
            debug!(
                capacity = self.capacity,
                "Evicted least-recently-used cache entry"
            );
            evicted
        } else {
            None
        };

        let entry = Some(CacheEntry::new(key.clone(), value));
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = entry;
                slot
            }
            None => {
                self.slots.push(entry);
                self.slots.len() - 1
            }
        };
        self.index.insert(key, slot);
        self.push_front(slot);
        evicted
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.index.get(key).copied()?;
        self.remove_slot(slot).map(|(_, value)| value)
    }

    /// Evict the least-recently-used entry.
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        let tail = self.tail?;
        self.remove_slot(tail)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries from most- to least-recently-used.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        std::iter::successors(self.head, move |&slot| self.slot(slot)?.next)
            .filter_map(move |slot| self.slot(slot))
            .map(|entry| (&entry.key, &entry.value))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            hit_rate: percentage(self.hits, self.hits + self.misses),
            utilization_rate: percentage(self.len() as u64, self.capacity as u64),
        }
    }

    #[cfg(test)]
    pub(super) fn slot_of<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(key).copied()
    }

    #[cfg(test)]
    pub(super) fn arena_len(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, slot: usize) -> Option<&CacheEntry<K, V>> {
        self.slots.get(slot)?.as_ref()
    }

    fn slot_mut(&mut self, slot: usize) -> Option<&mut CacheEntry<K, V>> {
        self.slots.get_mut(slot)?.as_mut()
    }

    fn touch(&mut self, slot: usize) {
        if self.head != Some(slot) {
            self.detach(slot);
            self.push_front(slot);
        }
        if let Some(entry) = self.slot_mut(slot) {
            entry.record_access();
        }
    }

    fn detach(&mut self, slot: usize) {
        let Some(entry) = self.slot_mut(slot) else {
            return;
        };
        let (prev, next) = (entry.prev.take(), entry.next.take());
        match prev {
            Some(p) => {
                if let Some(e) = self.slot_mut(p) {
                    e.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(e) = self.slot_mut(n) {
                    e.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, slot: usize) {
        let head = self.head;
        if let Some(entry) = self.slot_mut(slot) {
            entry.prev = None;
            entry.next = head;
        }
        match head {
            Some(h) => {
                if let Some(e) = self.slot_mut(h) {
                    e.prev = Some(slot);
                }
            }
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn remove_slot(&mut self, slot: usize) -> Option<(K, V)> {
        self.detach(slot);
        let removed = self.slots.get_mut(slot)?.take()?;
        self.free.push(slot);
        self.index.remove(&removed.key);
        Some((removed.key, removed.value))
    }
}
