//! circuit-memo: a memoization and invalidation layer for circuit simulations.
//!
//! A host engine re-evaluates circuit components (wires, repeaters, lamps...)
//! every tick. Most of those evaluations see exactly the inputs they saw last
//! time. This crate sits between the host's evaluation loop and its components
//! and short-circuits those repeats:
//!
//! - each component's inputs are reduced to an [`InputFingerprint`];
//! - the output computed for a fingerprint is kept in a bounded [`CacheStore`];
//! - a later evaluation with the same fingerprint restores the cached output
//!   instead of recomputing.
//!
//! Components are addressed by generation-tagged [`NodeKey`]s, so a cache
//! entry can never be served to a different component that reused its slot.
//! Whenever the layer cannot decide safely it defers to the host's own
//! evaluation; enabling it never changes simulation results.
//!
//! # Integration
//! The host implements [`CircuitHost`] and calls the three hooks of
//! [`CircuitOptimizer`]: `on_node_inserted`, `on_node_evaluated` and
//! `on_node_removed`. [`graph::CircuitSceneGraph`] is a complete reference host.
//!
//! # Example
//!
//! ```
//! use circuit_memo::prelude::*;
//! use std::sync::Arc;
//!
//! let optimizer = Arc::new(CircuitOptimizer::new(Config::default()));
//! let mut graph = CircuitSceneGraph::with_optimizer(Arc::clone(&optimizer));
//! let source = graph.add(BlockPos::new(0, 0, 0), ComponentKind::PowerSource, vec![]);
//! graph.set_power(source, 15);
//! let wire = graph.add(
//!     BlockPos::new(1, 0, 0),
//!     ComponentKind::Wire,
//!     vec![InputEdge::from_source(source).with_dampening(1)],
//! );
//!
//! assert_eq!(graph.evaluate(wire).outcome, Outcome::Miss);
//! assert_eq!(graph.evaluate(wire).outcome, Outcome::Hit);
//! assert_eq!(graph.strength(wire), Some(14));
//! ```

pub mod arena;
pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod guard;
pub mod metrics;
pub mod optimizer;
pub mod ordered_index;
pub mod reporter;

pub use crate::arena::{NodeArena, NodeKey, Resolved};
pub use crate::cache::{CacheEntry, CacheStore, EvictionPolicy};
pub use crate::config::{Config, TimedComponentPolicy};
pub use crate::core::{BlockPos, ChunkPos, CircuitComponent, CircuitHost, InputEdge};
pub use crate::error::{ConfigError, FingerprintError};
pub use crate::fingerprint::{FingerprintMode, InputFingerprint};
pub use crate::metrics::StatsSnapshot;
pub use crate::optimizer::{CircuitOptimizer, Evaluation, Outcome};
pub use crate::ordered_index::{OrderedChunkIndex, SortStrategy};

/// Prelude for convenient usage.
pub mod prelude {
    pub use crate::arena::{NodeKey, Resolved};
    pub use crate::cache::EvictionPolicy;
    pub use crate::config::{Config, TimedComponentPolicy};
    pub use crate::core::{BlockPos, ChunkPos, CircuitComponent, CircuitHost, InputEdge};
    pub use crate::fingerprint::{fingerprint, fingerprint_of, FingerprintMode, InputFingerprint};
    pub use crate::graph::{CircuitSceneGraph, ComponentKind};
    pub use crate::metrics::StatsSnapshot;
    pub use crate::optimizer::{CircuitOptimizer, Evaluation, Outcome};
    pub use crate::ordered_index::{OrderedChunkIndex, SortStrategy};
}
