//! Evaluation interception: the memoization decision and lifecycle hooks.
//!
//! `CircuitOptimizer` is the context object the host holds (usually behind an
//! `Arc`). It owns the cache store, the configuration and the counters, and
//! exposes the three interception points:
//!
//! - `on_node_inserted`: keep the chunk's component list in traversal order.
//! - `on_node_evaluated`: serve a cached output or recompute and refresh.
//! - `on_node_removed`: drop the component's cache entry.
//!
//! # Failure model
//! Fail-open. Whenever the optimizer cannot decide safely (disabled, nested
//! too deep, unreadable component) it defers to `CircuitHost::evaluate_uncached`
//! and returns the host's answer unchanged.
//!
//! # Reentrancy
//! A miss calls back into the host, which may evaluate other components through
//! this optimizer before returning. The store guard is reentrant, depth is
//! tracked per thread, and no store borrow is held across the host call.

use crate::arena::{NodeKey, Resolved};
use crate::cache::{CacheEntry, CacheStore};
use crate::config::{Config, TimedComponentPolicy};
use crate::core::{BlockPos, CircuitComponent, CircuitHost};
use crate::error::FingerprintError;
use crate::fingerprint::{fingerprint, InputFingerprint};
use crate::guard::{DepthGuard, SharedStore};
use crate::metrics::{Counters, StatsSnapshot};
use crate::ordered_index::OrderedChunkIndex;
use crate::reporter::StatsReporter;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How an evaluation was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Cached output reused; the host did not recompute.
    Hit,
    /// Fingerprint matched on a timed component; the host recomputed anyway.
    TimedHit,
    /// Recomputed by the host and stored.
    Miss,
    /// Cache bypassed by policy.
    Skip,
    /// Cache bypassed because the component could not be read safely.
    Fallback,
}

/// Result of one intercepted evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    /// Whether the component's output changed ("state changed" for the host).
    pub changed: bool,
    pub outcome: Outcome,
}

/// State shared between the simulation thread and the reporter.
#[derive(Debug)]
pub(crate) struct OptimizerState {
    pub(crate) enabled: AtomicBool,
    pub(crate) config: RwLock<Config>,
    pub(crate) store: SharedStore,
    pub(crate) counters: Counters,
}

impl OptimizerState {
    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        let (cache_size, evictions) = self.store.with(|store| (store.len(), store.evictions()));
        StatsSnapshot {
            hits: self.counters.hits(),
            misses: self.counters.misses(),
            skips: self.counters.skips(),
            fallbacks: self.counters.fallbacks(),
            cache_size,
            evictions,
        }
    }
}

/// Memoization layer for one host graph.
#[derive(Debug)]
pub struct CircuitOptimizer {
    state: Arc<OptimizerState>,
    reporter: Mutex<Option<StatsReporter>>,
}

impl CircuitOptimizer {
    /// Creates an optimizer. If `config.enabled`, it starts enabled (and
    /// starts the reporter when `config.debug`).
    pub fn new(config: Config) -> Self {
        let store = CacheStore::new(config.max_cache_size, config.eviction);
        let enabled = config.enabled;
        let optimizer = Self {
            state: Arc::new(OptimizerState {
                enabled: AtomicBool::new(false),
                config: RwLock::new(config),
                store: SharedStore::new(store),
                counters: Counters::new(),
            }),
            reporter: Mutex::new(None),
        };
        if enabled {
            optimizer.enable();
        }
        optimizer
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::Acquire)
    }

    /// Turns caching on and starts the reporter if `debug` is set.
    pub fn enable(&self) {
        let config = self.config();
        self.state.enabled.store(true, Ordering::Release);
        self.state.config.write().enabled = true;
        if config.debug {
            let mut reporter = self.reporter.lock();
            if reporter.is_none() {
                *reporter = Some(StatsReporter::spawn(
                    Arc::clone(&self.state),
                    config.report_interval(),
                ));
            }
        }
        info!(
            max_cache_size = config.max_cache_size,
            recursion_limit = config.recursion_limit,
            "circuit optimizer enabled"
        );
    }

    /// Turns caching off, stops the reporter, clears the store and resets
    /// the counters.
    pub fn disable(&self) {
        self.state.enabled.store(false, Ordering::Release);
        self.state.config.write().enabled = false;
        if let Some(reporter) = self.reporter.lock().take() {
            reporter.stop();
        }
        self.state.store.with(|store| {
            store.clear();
            store.reset_evictions();
        });
        self.state.counters.reset();
        info!("circuit optimizer disabled");
    }

    /// Replaces the configuration, resizing the store and switching on or off
    /// to match `config.enabled`.
    pub fn apply_config(&self, config: Config) {
        let enabled = config.enabled;
        self.state.store.with(|store| {
            store.set_policy(config.eviction);
            store.set_capacity(config.max_cache_size);
        });
        *self.state.config.write() = config;
        // Restart so a changed debug flag or interval takes effect.
        if let Some(reporter) = self.reporter.lock().take() {
            reporter.stop();
        }
        if enabled {
            self.enable();
        } else if self.is_enabled() {
            self.disable();
        }
    }

    /// Copy of the current configuration.
    pub fn config(&self) -> Config {
        self.state.config.read().clone()
    }

    /// Drops every cache entry.
    pub fn clear_cache(&self) {
        self.state.store.with(CacheStore::clear);
    }

    pub fn cache_size(&self) -> usize {
        self.state.store.with(|store| store.len())
    }

    /// Cache entry currently held for `key`, if any (no recency update).
    pub fn cached(&self, key: NodeKey) -> Option<CacheEntry> {
        self.state.store.with(|store| store.peek(key).copied())
    }

    /// Current statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.state.snapshot()
    }

    pub fn is_reporting(&self) -> bool {
        self.reporter.lock().is_some()
    }

    /// Node-inserted hook: adds the component to its chunk list in order.
    pub fn on_node_inserted(&self, index: &mut OrderedChunkIndex, pos: BlockPos, key: NodeKey) {
        let strategy = self.state.config.read().sort_strategy;
        index.insert(pos, key, strategy);
    }

    /// Node-removed hook: forgets the component's cached result.
    ///
    /// Must run before the host frees `key`'s slot.
    pub fn on_node_removed(&self, key: NodeKey) {
        let removed = self.state.store.with(|store| store.remove(key));
        if removed.is_some() && self.state.config.read().debug {
            debug!(%key, "cache entry invalidated on removal");
        }
    }

    /// Node-evaluated hook. Returns whether the component's state changed.
    pub fn on_node_evaluated<H: CircuitHost>(&self, host: &mut H, key: NodeKey, pos: BlockPos) -> bool {
        self.evaluate(host, key, pos).changed
    }

    /// Node-evaluated hook with the outcome exposed.
    pub fn evaluate<H: CircuitHost>(&self, host: &mut H, key: NodeKey, pos: BlockPos) -> Evaluation {
        let depth = DepthGuard::enter();
        let (limit, timed_policy, mode, verbose) = {
            let config = self.state.config.read();
            (config.recursion_limit, config.timed_policy, config.fingerprint_mode, config.debug)
        };

        if !self.is_enabled() || depth.exceeds(limit) {
            if verbose && depth.exceeds(limit) {
                debug!(%key, depth = depth.depth(), "recursion limit reached, bypassing cache");
            }
            return self.bypass(host, key, pos, Outcome::Skip);
        }

        let probe = match host.resolve(key) {
            Resolved::Live(component) => {
                let timed = component.has_internal_timer();
                if timed && timed_policy == TimedComponentPolicy::Exclude {
                    Ok(None)
                } else {
                    fingerprint(&*host, component, mode).map(|current| Some((current, timed)))
                }
            }
            Resolved::Vacant | Resolved::Stale => Err(FingerprintError::StaleComponent(key)),
        };
        let (current, timed) = match probe {
            Ok(Some(probe)) => probe,
            Ok(None) => return self.bypass(host, key, pos, Outcome::Skip),
            Err(err) => {
                warn!(%key, %err, "cannot fingerprint component, recomputing uncached");
                return self.bypass(host, key, pos, Outcome::Fallback);
            }
        };

        let held = self.state.store.lock();
        let cached = held
            .with(|store| store.lookup(key))
            .filter(|entry| entry.fingerprint == current);

        let evaluation = match cached {
            Some(entry) if !timed => self.serve_cached(host, key, entry),
            Some(_) => {
                let changed = host.evaluate_uncached(key, pos);
                self.refresh(host, key, current);
                self.state.counters.record_hit();
                Evaluation { changed, outcome: Outcome::TimedHit }
            }
            None => {
                let changed = host.evaluate_uncached(key, pos);
                self.refresh(host, key, current);
                self.state.counters.record_miss();
                Evaluation { changed, outcome: Outcome::Miss }
            }
        };
        drop(held);

        if verbose {
            debug!(%key, %pos, outcome = ?evaluation.outcome, changed = evaluation.changed, "evaluated");
        }
        evaluation
    }

    fn bypass<H: CircuitHost>(&self, host: &mut H, key: NodeKey, pos: BlockPos, outcome: Outcome) -> Evaluation {
        match outcome {
            Outcome::Fallback => self.state.counters.record_fallback(),
            _ => self.state.counters.record_skip(),
        }
        Evaluation {
            changed: host.evaluate_uncached(key, pos),
            outcome,
        }
    }

    /// Writes the cached output back if the live one differs.
    fn serve_cached<H: CircuitHost>(&self, host: &mut H, key: NodeKey, entry: CacheEntry) -> Evaluation {
        let changed = match host.component_mut(key) {
            Some(component) if component.strength() != entry.last_output => {
                component.set_strength(entry.last_output);
                true
            }
            _ => false,
        };
        self.state.counters.record_hit();
        Evaluation { changed, outcome: Outcome::Hit }
    }

    /// Stores the post-recomputation output of `key` under `fingerprint`.
    ///
    /// The store is looked up afresh: the host call may have touched it.
    fn refresh<H: CircuitHost>(&self, host: &H, key: NodeKey, fingerprint: InputFingerprint) {
        // The component may have removed itself while recomputing.
        let Some(output) = host.resolve(key).live().map(CircuitComponent::strength) else {
            return;
        };
        let entry = CacheEntry::new(key, fingerprint, output, host.current_tick());
        self.state.store.with(|store| store.upsert(key, entry));
    }
}

impl Default for CircuitOptimizer {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Drop for CircuitOptimizer {
    fn drop(&mut self) {
        if let Some(reporter) = self.reporter.get_mut().take() {
            reporter.stop();
        }
    }
}
