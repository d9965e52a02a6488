//! Per-chunk lists of active components, kept in traversal order.
//!
//! Within a chunk, components are visited in `(x, z, y)` ascending order so
//! that evaluation order does not depend on insertion history.
//!
//! # Maintenance
//! Insertion appends and then restores order. Only the appended element can be
//! out of place, so `SortStrategy::InsertionPass` bubbles it backwards: O(1)
//! for the common already-ordered append, O(n) worst case.
//! `SortStrategy::FullSort` re-sorts the list (O(n log n)).

use crate::arena::NodeKey;
use crate::core::{BlockPos, ChunkPos};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// How a chunk list is re-ordered after an insertion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortStrategy {
    FullSort,
    #[default]
    InsertionPass,
}

/// Traversal order: x, then z, then y.
pub fn traversal_order(a: &BlockPos, b: &BlockPos) -> Ordering {
    (a.x, a.z, a.y).cmp(&(b.x, b.z, b.y))
}

/// Active components of one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkComponentList {
    items: Vec<(BlockPos, NodeKey)>,
    /// Set on every insertion; the host clears it once it has evaluated the chunk.
    pub should_evaluate: bool,
}

impl ChunkComponentList {
    /// Components in traversal order.
    pub fn items(&self) -> &[(BlockPos, NodeKey)] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the list is in traversal order.
    pub fn is_sorted(&self) -> bool {
        self.items
            .windows(2)
            .all(|pair| traversal_order(&pair[0].0, &pair[1].0) != Ordering::Greater)
    }

    fn push(&mut self, pos: BlockPos, key: NodeKey, strategy: SortStrategy) {
        self.items.push((pos, key));
        match strategy {
            SortStrategy::FullSort => self.items.sort_by(|a, b| traversal_order(&a.0, &b.0)),
            SortStrategy::InsertionPass => {
                let mut idx = self.items.len() - 1;
                while idx > 0
                    && traversal_order(&self.items[idx].0, &self.items[idx - 1].0) == Ordering::Less
                {
                    self.items.swap(idx, idx - 1);
                    idx -= 1;
                }
            }
        }
        self.should_evaluate = true;
    }

    fn remove(&mut self, pos: BlockPos) -> Option<NodeKey> {
        let idx = self.items.iter().position(|(p, _)| *p == pos)?;
        // `Vec::remove` keeps the remaining items in order.
        Some(self.items.remove(idx).1)
    }
}

/// Chunk -> ordered active component list.
///
/// Lists are created on first insertion into a chunk and live as long as the
/// index does.
#[derive(Debug, Clone, Default)]
pub struct OrderedChunkIndex {
    chunks: HashMap<ChunkPos, ChunkComponentList>,
}

impl OrderedChunkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key` at `pos` to its chunk list and restores traversal order.
    pub fn insert(&mut self, pos: BlockPos, key: NodeKey, strategy: SortStrategy) {
        self.chunks
            .entry(pos.chunk())
            .or_default()
            .push(pos, key, strategy);
    }

    /// Drops the component at `pos` from its chunk list.
    pub fn remove(&mut self, pos: BlockPos) -> Option<NodeKey> {
        self.chunks.get_mut(&pos.chunk())?.remove(pos)
    }

    /// The list of the chunk containing `pos`.
    pub fn chunk(&self, pos: BlockPos) -> Option<&ChunkComponentList> {
        self.chunks.get(&pos.chunk())
    }

    /// Components of `chunk` in traversal order; empty if the chunk was never
    /// populated.
    pub fn iter_chunk(&self, chunk: ChunkPos) -> impl Iterator<Item = &(BlockPos, NodeKey)> + '_ {
        self.chunks
            .get(&chunk)
            .into_iter()
            .flat_map(|list| list.items.iter())
    }

    pub fn chunk_mut(&mut self, chunk: ChunkPos) -> Option<&mut ChunkComponentList> {
        self.chunks.get_mut(&chunk)
    }

    /// Chunk positions in ascending order.
    pub fn chunks(&self) -> Vec<ChunkPos> {
        let mut chunks: Vec<_> = self.chunks.keys().copied().collect();
        chunks.sort();
        chunks
    }

    /// Every indexed component: chunks ascending, traversal order within.
    pub fn traversal(&self) -> Vec<(BlockPos, NodeKey)> {
        self.chunks()
            .into_iter()
            .flat_map(|chunk| self.chunks[&chunk].items.iter().copied())
            .collect()
    }

    /// Number of indexed components across all chunks.
    pub fn len(&self) -> usize {
        self.chunks.values().map(ChunkComponentList::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
