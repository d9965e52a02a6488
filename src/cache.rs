//! Bounded memoization store for component evaluations.
//!
//! Entries are keyed by arena slot and carry the generation they were written
//! for. A lookup with a key of another generation never returns the entry: the
//! stale entry is dropped on the spot and the probe reports absence. This closes
//! the window in which a removed component's slot is reused before its removal
//! notification was processed.
//!
//! # Eviction
//! - `EvictionPolicy::Lru` (default): evict the least recently used entry when a
//!   new slot is inserted at capacity. The per-tick working set survives.
//! - `EvictionPolicy::ClearOnOverflow`: drop everything at capacity. Cheaper
//!   bookkeeping, but every overflow restarts the whole graph cold.

use crate::arena::NodeKey;
use crate::fingerprint::InputFingerprint;
use lru::LruCache;
use serde::{Deserialize, Serialize};

/// Default capacity bound, in entries.
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1_000_000;

/// Memoized result of one component evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint of the inputs the output was computed from.
    pub fingerprint: InputFingerprint,
    /// Output strength after the evaluation.
    pub last_output: i32,
    /// Tick of the last write.
    pub last_update_tick: u64,
    /// Generation of the slot the entry was written for.
    pub generation: u32,
}

impl CacheEntry {
    /// Creates an entry for `key`.
    pub fn new(key: NodeKey, fingerprint: InputFingerprint, last_output: i32, tick: u64) -> Self {
        Self {
            fingerprint,
            last_output,
            last_update_tick: tick,
            generation: key.generation(),
        }
    }
}

/// What happens when a new entry arrives at capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    #[default]
    Lru,
    ClearOnOverflow,
}

/// Slot-keyed, capacity-bounded cache of evaluation results.
#[derive(Debug)]
pub struct CacheStore {
    entries: LruCache<u32, CacheEntry>,
    capacity: usize,
    policy: EvictionPolicy,
    evictions: u64,
}

impl CacheStore {
    /// Creates an empty store. A capacity of zero is treated as one.
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity: capacity.max(1),
            policy,
            evictions: 0,
        }
    }

    /// Returns the entry for `key` and marks it most recently used.
    ///
    /// An entry left behind by an earlier generation of the slot is removed
    /// and `None` is returned.
    pub fn lookup(&mut self, key: NodeKey) -> Option<CacheEntry> {
        let entry = *self.entries.get(&key.slot())?;
        if entry.generation == key.generation() {
            Some(entry)
        } else {
            self.entries.pop(&key.slot());
            None
        }
    }

    /// Like `lookup`, without touching recency or dropping stale entries.
    pub fn peek(&self, key: NodeKey) -> Option<&CacheEntry> {
        self.entries
            .peek(&key.slot())
            .filter(|entry| entry.generation == key.generation())
    }

    /// Inserts or refreshes the entry for `key`.
    pub fn upsert(&mut self, key: NodeKey, entry: CacheEntry) {
        debug_assert_eq!(entry.generation, key.generation());
        if !self.entries.contains(&key.slot()) && self.entries.len() >= self.capacity {
            self.make_room();
        }
        self.entries.put(key.slot(), entry);
    }

    /// Removes whatever entry occupies `key`'s slot.
    ///
    /// An older generation's leftover is dropped too; removing an absent key
    /// is a no-op.
    pub fn remove(&mut self, key: NodeKey) -> Option<CacheEntry> {
        self.entries
            .pop(&key.slot())
            .filter(|entry| entry.generation == key.generation())
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Number of entries dropped to respect the capacity bound.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Changes the capacity, evicting least recently used entries if the
    /// store is now over the bound.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            if self.entries.pop_lru().is_some() {
                self.evictions += 1;
            }
        }
    }

    pub fn reset_evictions(&mut self) {
        self.evictions = 0;
    }

    pub fn set_policy(&mut self, policy: EvictionPolicy) {
        self.policy = policy;
    }

    fn make_room(&mut self) {
        match self.policy {
            EvictionPolicy::Lru => {
                if self.entries.pop_lru().is_some() {
                    self.evictions += 1;
                }
            }
            EvictionPolicy::ClearOnOverflow => {
                self.evictions += self.entries.len() as u64;
                self.entries.clear();
            }
        }
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CACHE_SIZE, EvictionPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(slot: u32) -> NodeKey {
        NodeKey::new(slot, 0)
    }

    fn entry_for(key: NodeKey, output: i32) -> CacheEntry {
        CacheEntry::new(key, InputFingerprint::from_raw(u64::from(key.slot())), output, 0)
    }

    #[test]
    fn lookup_after_upsert() {
        let mut store = CacheStore::new(8, EvictionPolicy::Lru);
        assert!(store.lookup(key(1)).is_none());
        store.upsert(key(1), entry_for(key(1), 7));
        assert_eq!(store.lookup(key(1)).map(|e| e.last_output), Some(7));
        assert_eq!(store.len(), 1);

        store.upsert(key(1), entry_for(key(1), 9));
        assert_eq!(store.lookup(key(1)).map(|e| e.last_output), Some(9));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn generation_mismatch_is_absent() {
        let mut store = CacheStore::new(8, EvictionPolicy::Lru);
        let old = NodeKey::new(4, 0);
        let reused = NodeKey::new(4, 1);
        store.upsert(old, entry_for(old, 15));

        assert!(store.peek(reused).is_none());
        assert!(store.lookup(reused).is_none());
        // The stale entry is gone even for its own key now.
        assert!(store.lookup(old).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = CacheStore::new(8, EvictionPolicy::Lru);
        store.upsert(key(2), entry_for(key(2), 1));
        assert!(store.remove(key(2)).is_some());
        assert!(store.remove(key(2)).is_none());
        assert!(store.remove(key(99)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn lru_bound_holds() {
        let capacity = 16;
        let mut store = CacheStore::new(capacity, EvictionPolicy::Lru);
        for slot in 0..(capacity as u32 + 10) {
            store.upsert(key(slot), entry_for(key(slot), 0));
            assert!(store.len() <= capacity);
        }
        assert_eq!(store.len(), capacity);
        assert_eq!(store.evictions(), 10);
        // Oldest ten are gone, newest are present.
        assert!(store.peek(key(0)).is_none());
        assert!(store.peek(key(9)).is_none());
        assert!(store.peek(key(10)).is_some());
        assert!(store.peek(key(25)).is_some());
    }

    #[test]
    fn clear_on_overflow_bound_holds() {
        let capacity = 4;
        let mut store = CacheStore::new(capacity, EvictionPolicy::ClearOnOverflow);
        for slot in 0..(capacity as u32 + 3) {
            store.upsert(key(slot), entry_for(key(slot), 0));
            assert!(store.len() <= capacity);
        }
        // Overflow at slot 4 dropped everything before it.
        assert_eq!(store.len(), 3);
        assert_eq!(store.evictions(), 4);
    }

    #[test]
    fn lookup_promotes() {
        let mut store = CacheStore::new(2, EvictionPolicy::Lru);
        store.upsert(key(1), entry_for(key(1), 0));
        store.upsert(key(2), entry_for(key(2), 0));
        assert!(store.lookup(key(1)).is_some());
        store.upsert(key(3), entry_for(key(3), 0));

        assert!(store.peek(key(1)).is_some());
        assert!(store.peek(key(2)).is_none());
    }

    #[test]
    fn refreshing_existing_slot_at_capacity_does_not_evict() {
        let mut store = CacheStore::new(2, EvictionPolicy::Lru);
        store.upsert(key(1), entry_for(key(1), 0));
        store.upsert(key(2), entry_for(key(2), 0));
        store.upsert(key(1), entry_for(key(1), 5));
        assert_eq!(store.len(), 2);
        assert_eq!(store.evictions(), 0);
    }

    #[test]
    fn shrinking_capacity_evicts() {
        let mut store = CacheStore::new(10, EvictionPolicy::Lru);
        for slot in 0..10 {
            store.upsert(key(slot), entry_for(key(slot), 0));
        }
        store.set_capacity(3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.capacity(), 3);
        assert!(store.peek(key(9)).is_some());
    }
}
