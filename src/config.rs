//! Runtime configuration.
//!
//! Loading and saving the file is the host's business; this module only
//! defines the shape, its defaults, and the textual (JSON) form. Missing
//! fields take their defaults, so older files keep working.

use crate::cache::{EvictionPolicy, DEFAULT_MAX_CACHE_SIZE};
use crate::error::ConfigError;
use crate::fingerprint::FingerprintMode;
use crate::guard::DEFAULT_RECURSION_LIMIT;
use crate::ordered_index::SortStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Current configuration format version.
pub const CONFIG_VERSION: u32 = 1;

/// How components with internal timing state are cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimedComponentPolicy {
    /// Cache them, but recompute through the host whenever the fingerprint
    /// matches. Counted as hits.
    #[default]
    RecomputeOnHit,
    /// Never cache them. Counted as skips.
    Exclude,
}

/// Optimizer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    /// Master switch. When off every evaluation passes through uncached.
    pub enabled: bool,
    /// Per-call logging and the periodic statistics reporter.
    pub debug: bool,
    /// Capacity bound of the cache store, in entries.
    pub max_cache_size: usize,
    pub eviction: EvictionPolicy,
    /// Nesting depth past which evaluations bypass the cache.
    pub recursion_limit: usize,
    pub timed_policy: TimedComponentPolicy,
    pub sort_strategy: SortStrategy,
    pub fingerprint_mode: FingerprintMode,
    /// Reporter wake-up interval in milliseconds.
    pub report_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            enabled: true,
            debug: false,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            eviction: EvictionPolicy::default(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            timed_policy: TimedComponentPolicy::default(),
            sort_strategy: SortStrategy::default(),
            fingerprint_mode: FingerprintMode::default(),
            report_interval_ms: 5_000,
        }
    }
}

impl Config {
    /// Parses and validates a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rejects values the optimizer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_cache_size == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.recursion_limit == 0 {
            return Err(ConfigError::ZeroRecursionLimit);
        }
        if self.report_interval_ms == 0 {
            return Err(ConfigError::ZeroReportInterval);
        }
        Ok(())
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}
