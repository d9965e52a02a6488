//! Error types.
//!
//! None of these reach the host simulation: evaluation is fail-open and turns
//! a `FingerprintError` into an uncached recomputation.

use crate::arena::NodeKey;
use thiserror::Error;

/// Fingerprinting could not read a component's inputs safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FingerprintError {
    /// The component being evaluated is no longer live.
    #[error("component {0} is not live")]
    StaleComponent(NodeKey),

    /// An input references a slot that now holds a different generation.
    #[error("input source slot {slot} was reused (edge expected generation {generation})")]
    StaleSource { slot: u32, generation: u32 },
}

/// Configuration could not be parsed or is out of range.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("max_cache_size must be at least 1")]
    ZeroCapacity,

    #[error("recursion_limit must be at least 1")]
    ZeroRecursionLimit,

    #[error("report_interval_ms must be at least 1")]
    ZeroReportInterval,
}
