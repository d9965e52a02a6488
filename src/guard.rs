//! Recursion and concurrency guards around the cache store.
//!
//! Evaluating one component may recompute it through the host, and the host
//! may evaluate dependents through the interception layer again before the
//! outer call returns. Two guards keep that safe:
//!
//! - `DepthGuard` counts nesting on the current thread. Past the configured
//!   limit the caller stops caching and defers to the host.
//! - `SharedStore` serializes store access behind a reentrant mutex. The
//!   simulation thread can re-acquire it while already holding it; a reporter
//!   thread blocks until the outermost evaluation is done and never observes a
//!   half-written store.
//!
//! Store borrows are scoped to a closure and never span a host call.

use crate::cache::CacheStore;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::{Cell, RefCell};

/// Default nesting depth past which evaluation bypasses the cache.
pub const DEFAULT_RECURSION_LIMIT: usize = 500;

thread_local! {
    /// Number of interception frames active on this thread.
    static EVAL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// RAII counter for nested evaluations on the current thread.
///
/// Increments on creation, decrements on drop (including unwinds), so every
/// exit path of an evaluation restores the depth.
#[must_use = "the depth is released as soon as the guard is dropped"]
pub struct DepthGuard {
    depth: usize,
}

impl DepthGuard {
    /// Enters one more evaluation frame.
    pub fn enter() -> Self {
        let depth = EVAL_DEPTH.with(|cell| {
            let depth = cell.get() + 1;
            cell.set(depth);
            depth
        });
        Self { depth }
    }

    /// Depth of this frame (1 for an outermost evaluation).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether this frame is nested deeper than `limit`.
    pub fn exceeds(&self, limit: usize) -> bool {
        self.depth > limit
    }

    /// Current depth on this thread, without entering a frame.
    pub fn current() -> usize {
        EVAL_DEPTH.with(Cell::get)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        EVAL_DEPTH.with(|cell| cell.set(cell.get().saturating_sub(1)));
    }
}

/// Cache store behind the reentrant concurrency guard.
#[derive(Debug)]
pub struct SharedStore {
    inner: ReentrantMutex<RefCell<CacheStore>>,
}

impl SharedStore {
    pub fn new(store: CacheStore) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(store)),
        }
    }

    /// Holds the guard until the returned value is dropped.
    ///
    /// Re-locking from the same thread succeeds immediately.
    pub fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            guard: self.inner.lock(),
        }
    }

    /// Locks, runs `f` on the store, and unlocks.
    pub fn with<R>(&self, f: impl FnOnce(&mut CacheStore) -> R) -> R {
        self.lock().with(f)
    }
}

/// Held concurrency guard.
pub struct StoreGuard<'a> {
    guard: ReentrantMutexGuard<'a, RefCell<CacheStore>>,
}

impl StoreGuard<'_> {
    /// Runs `f` with exclusive access to the store.
    ///
    /// `f` must not call back into the host; anything it needs after a host
    /// call has to be looked up again in a fresh `with`.
    pub fn with<R>(&self, f: impl FnOnce(&mut CacheStore) -> R) -> R {
        f(&mut self.guard.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::NodeKey;
    use crate::cache::{CacheEntry, EvictionPolicy};
    use crate::fingerprint::InputFingerprint;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn depth_tracks_nesting() {
        assert_eq!(DepthGuard::current(), 0);
        {
            let outer = DepthGuard::enter();
            assert_eq!(outer.depth(), 1);
            {
                let inner = DepthGuard::enter();
                assert_eq!(inner.depth(), 2);
                assert!(inner.exceeds(1));
                assert!(!inner.exceeds(2));
            }
            assert_eq!(DepthGuard::current(), 1);
        }
        assert_eq!(DepthGuard::current(), 0);
    }

    #[test]
    fn depth_is_per_thread() {
        let _held = DepthGuard::enter();
        let other = thread::spawn(DepthGuard::current).join().unwrap();
        assert_eq!(other, 0);
        assert_eq!(DepthGuard::current(), 1);
    }

    #[test]
    fn depth_restored_after_panic() {
        let result = std::panic::catch_unwind(|| {
            let _guard = DepthGuard::enter();
            panic!("evaluation failed");
        });
        assert!(result.is_err());
        assert_eq!(DepthGuard::current(), 0);
    }

    #[test]
    fn store_guard_is_reentrant() {
        let shared = SharedStore::new(CacheStore::new(4, EvictionPolicy::Lru));
        let key = NodeKey::new(0, 0);
        let outer = shared.lock();
        outer.with(|store| store.upsert(key, CacheEntry::new(key, InputFingerprint::EMPTY, 3, 0)));
        {
            let inner = shared.lock();
            assert_eq!(inner.with(|store| store.len()), 1);
            inner.with(|store| store.remove(key));
        }
        assert!(outer.with(|store| store.lookup(key)).is_none());
    }

    #[test]
    fn other_thread_waits_for_outermost_release() {
        let shared = Arc::new(SharedStore::new(CacheStore::new(4, EvictionPolicy::Lru)));
        let outer = shared.lock();
        let key = NodeKey::new(1, 0);

        let reader = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || shared.with(|store| store.len()))
        };
        {
            let _nested = shared.lock();
            outer.with(|store| store.upsert(key, CacheEntry::new(key, InputFingerprint::EMPTY, 1, 0)));
        }
        drop(outer);
        assert_eq!(reader.join().unwrap(), 1);
    }
}
