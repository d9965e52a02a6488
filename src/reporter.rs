//! Periodic statistics reporter.
//!
//! A background thread that wakes every interval, takes a `StatsSnapshot` and
//! logs it. Stopping is cooperative: the thread finishes its current sleep,
//! sees the stop flag, and exits; `stop` joins it.

use crate::metrics::StatsSnapshot;
use crate::optimizer::OptimizerState;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// Anything the reporter can sample.
pub trait StatsSource: Send + Sync + 'static {
    fn snapshot(&self) -> StatsSnapshot;
}

impl StatsSource for OptimizerState {
    fn snapshot(&self) -> StatsSnapshot {
        OptimizerState::snapshot(self)
    }
}

/// Receives every record the reporter emits, after it is logged.
pub type ReportSink = Box<dyn FnMut(&StatsSnapshot) + Send>;

/// Handle to a running reporter thread.
pub struct StatsReporter {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl StatsReporter {
    /// Starts a reporter that only logs.
    pub fn spawn<S: StatsSource>(source: Arc<S>, interval: Duration) -> Self {
        Self::spawn_with_sink(source, interval, None)
    }

    /// Starts a reporter that logs and forwards each record to `sink`.
    pub fn spawn_with_sink<S: StatsSource>(
        source: Arc<S>,
        interval: Duration,
        mut sink: Option<ReportSink>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("circuit-memo-stats".into())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    thread::sleep(interval);
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    let snapshot = source.snapshot();
                    info!(
                        hits = snapshot.hits,
                        misses = snapshot.misses,
                        skips = snapshot.skips,
                        fallbacks = snapshot.fallbacks,
                        cache_size = snapshot.cache_size,
                        hit_rate = snapshot.hit_rate(),
                        "cache statistics"
                    );
                    if let Some(sink) = sink.as_mut() {
                        sink(&snapshot);
                    }
                }
            });
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                // Statistics are optional; caching works without them.
                warn!(%err, "failed to start statistics reporter");
                None
            }
        };
        Self { stop, handle, interval }
    }

    /// Whether the reporter thread is running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Requests a stop and waits for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("statistics reporter panicked");
            }
        }
    }
}

impl Drop for StatsReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for StatsReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsReporter")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}
