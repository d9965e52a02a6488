//! Core vocabulary shared by the cache and its host.
//!
//! The host simulation owns every component. This crate only sees components
//! through the `CircuitComponent` trait and reaches them through
//! `CircuitHost::resolve`, which performs the liveness check once.

use crate::arena::{NodeKey, Resolved};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side length of a chunk column, in blocks.
pub const CHUNK_SIZE: i32 = 16;

/// Block position of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    /// Creates a new position.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the chunk column containing this position.
    #[inline]
    pub const fn chunk(&self) -> ChunkPos {
        ChunkPos::new(self.x.div_euclid(CHUNK_SIZE), self.z.div_euclid(CHUNK_SIZE))
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Coarse spatial region used to group components for ordered traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    /// Creates a new chunk position.
    #[inline]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// A direct input of a component, with its per-edge modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputEdge {
    /// Component feeding this edge.
    pub source: NodeKey,
    /// Strength lost along the edge.
    pub dampening: i32,
    /// Whether the source powers the consumer directly.
    pub directly_powered: bool,
    /// Facing code of the edge.
    pub direction: u8,
    /// Auxiliary datum attached by the host.
    pub data: i32,
}

impl InputEdge {
    /// Creates an edge with no dampening, not directly powered, facing 0.
    pub fn from_source(source: NodeKey) -> Self {
        Self {
            source,
            dampening: 0,
            directly_powered: false,
            direction: 0,
            data: 0,
        }
    }

    /// Sets the dampening amount.
    pub fn with_dampening(mut self, dampening: i32) -> Self {
        self.dampening = dampening;
        self
    }

    /// Marks the edge as directly powered.
    pub fn directly_powered(mut self, directly_powered: bool) -> Self {
        self.directly_powered = directly_powered;
        self
    }

    /// Sets the direction code.
    pub fn with_direction(mut self, direction: u8) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the auxiliary datum.
    pub fn with_data(mut self, data: i32) -> Self {
        self.data = data;
        self
    }
}

/// View of a host component as seen by the cache.
pub trait CircuitComponent {
    /// Current output strength.
    fn strength(&self) -> i32;

    /// Overwrites the output strength (used when serving a cached result).
    fn set_strength(&mut self, strength: i32);

    /// Direct inputs in their current iteration order.
    fn inputs(&self) -> &[InputEdge];

    /// Whether the output can change with constant inputs (delays, edge
    /// detectors, self-decaying sources).
    fn has_internal_timer(&self) -> bool;

    /// Category tag, folded into the fingerprint only in type-sensitive mode.
    fn kind_tag(&self) -> u32 {
        0
    }
}

/// The simulation engine, as seen from the interception layer.
pub trait CircuitHost {
    type Component: CircuitComponent;

    /// Validated accessor for a component.
    fn resolve(&self, key: NodeKey) -> Resolved<'_, Self::Component>;

    /// Mutable access to a live component.
    fn component_mut(&mut self, key: NodeKey) -> Option<&mut Self::Component>;

    /// The authoritative recomputation. Returns whether the output changed.
    ///
    /// May re-enter the interception layer for other components.
    fn evaluate_uncached(&mut self, key: NodeKey, pos: BlockPos) -> bool;

    /// Current simulation tick.
    fn current_tick(&self) -> u64;
}
