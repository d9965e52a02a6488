//! Generation-tagged slot arena for circuit components.
//!
//! Provides `NodeKey` (slot index plus generation) and `NodeArena` (contiguous
//! storage with free-list reuse). Every time a freed slot is handed out again
//! its generation is bumped, so a key minted for a removed component can never
//! alias the component that later occupies the same slot.
//!
//! # Determinism
//! - `NodeKey` ordering is by `(slot, generation)`.
//! - Iteration order over slots is by index.
//! - Free-list reuse is LIFO: the most recently freed slot is reused first.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a component in the host graph.
///
/// `slot` is the arena index, `generation` counts how many times that slot has
/// been reused. Two keys denote the same live component only if both match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    slot: u32,
    generation: u32,
}

impl NodeKey {
    /// Creates a key from its raw parts.
    #[inline]
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Returns the slot index.
    #[inline]
    pub const fn slot(&self) -> u32 {
        self.slot
    }

    /// Returns the generation of the slot this key was minted for.
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKey({}v{})", self.slot, self.generation)
    }
}

/// Outcome of resolving a `NodeKey` against its arena.
///
/// This is the single validated accessor through which the crate reads host
/// components: a reference is only handed out after the liveness check.
#[derive(Debug)]
pub enum Resolved<'a, T> {
    /// The key names a live component.
    Live(&'a T),
    /// The slot is free (or was never allocated).
    Vacant,
    /// The slot is occupied by a different generation.
    Stale,
}

impl<'a, T> Resolved<'a, T> {
    /// Returns the live component, if any.
    pub fn live(self) -> Option<&'a T> {
        match self {
            Resolved::Live(value) => Some(value),
            Resolved::Vacant | Resolved::Stale => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    data: Option<T>,
    generation: u32,
    next_free: Option<u32>,
}

/// Contiguous storage for component data with generation-checked reuse.
#[derive(Debug, Clone)]
pub struct NodeArena<T> {
    slots: Vec<Slot<T>>,
    free_list_head: Option<u32>,
    live_count: usize,
}

impl<T> NodeArena<T> {
    /// Creates a new empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list_head: None,
            live_count: 0,
        }
    }

    /// Allocates a slot for `data` and returns its key.
    ///
    /// A reused slot gets its generation incremented before the key is minted.
    pub fn allocate(&mut self, data: T) -> NodeKey {
        self.live_count += 1;
        if let Some(idx) = self.free_list_head {
            let slot = &mut self.slots[idx as usize];
            debug_assert!(slot.data.is_none(), "free slot should have no data");
            self.free_list_head = slot.next_free;
            slot.generation = slot.generation.wrapping_add(1);
            slot.data = Some(data);
            slot.next_free = None;
            NodeKey::new(idx, slot.generation)
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Slot {
                data: Some(data),
                generation: 0,
                next_free: None,
            });
            NodeKey::new(idx, 0)
        }
    }

    /// Frees the slot named by `key` and returns its data.
    ///
    /// Returns `None` if the key is stale or the slot is already free.
    pub fn deallocate(&mut self, key: NodeKey) -> Option<T> {
        let idx = key.slot();
        let slot = self.slots.get_mut(idx as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        let data = slot.data.take()?;
        slot.next_free = self.free_list_head;
        self.free_list_head = Some(idx);
        self.live_count -= 1;
        Some(data)
    }

    /// Resolves `key`, distinguishing free slots from reused ones.
    pub fn resolve(&self, key: NodeKey) -> Resolved<'_, T> {
        match self.slots.get(key.slot() as usize) {
            None => Resolved::Vacant,
            Some(slot) => match &slot.data {
                None => Resolved::Vacant,
                Some(_) if slot.generation != key.generation() => Resolved::Stale,
                Some(data) => Resolved::Live(data),
            },
        }
    }

    /// Returns the data for `key` if it is live.
    pub fn get(&self, key: NodeKey) -> Option<&T> {
        self.resolve(key).live()
    }

    /// Returns mutable data for `key` if it is live.
    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.slot() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        slot.data.as_mut()
    }

    /// Returns the number of live components.
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Returns the number of slots, free ones included.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterates over live components in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeKey, &T)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.data
                .as_ref()
                .map(|data| (NodeKey::new(idx as u32, slot.generation), data))
        })
    }
}

impl<T> Default for NodeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
