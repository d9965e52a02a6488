//! Hit, miss and skip counters.
//!
//! Written by the interception layer on the simulation thread and read by the
//! reporter thread. Each counter is independent, so relaxed atomics suffice;
//! a snapshot may be one evaluation out of date.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one enabled period.
#[derive(Debug, Default)]
pub struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    skips: AtomicU64,
    fallbacks: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached output served without recomputation, or a timed component
    /// recomputed on a matching fingerprint.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Fingerprint absent or changed; result recomputed and stored.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Cache bypassed by policy (disabled, recursion limit, excluded kind).
    pub fn record_skip(&self) {
        self.skips.fetch_add(1, Ordering::Relaxed);
    }

    /// Cache bypassed because a component could not be read safely.
    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn skips(&self) -> u64 {
        self.skips.load(Ordering::Relaxed)
    }

    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.skips.store(0, Ordering::Relaxed);
        self.fallbacks.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time statistics record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub skips: u64,
    pub fallbacks: u64,
    pub cache_size: usize,
    pub evictions: u64,
}

impl StatsSnapshot {
    /// Hits as a percentage of lookups (hits + misses); 0 with no lookups.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 * 100.0 / lookups as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} skips={} fallbacks={} size={} evictions={} hit_rate={:.2}%",
            self.hits,
            self.misses,
            self.skips,
            self.fallbacks,
            self.cache_size,
            self.evictions,
            self.hit_rate()
        )
    }
}
