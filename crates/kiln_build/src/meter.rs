//! Progress reporting for builds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::{debug, info};

/// Receives progress from running tasks and the completion of a build.
pub trait Meter: Send + Sync {
    /// Records `count` units of work under `tag`.
    fn step(&self, tag: &str, count: u64) {
        let _ = (tag, count);
    }

    /// Called once when a build finishes successfully.
    fn done(&self);
}

/// A meter that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullMeter;

impl Meter for NullMeter {
    fn done(&self) {}
}

/// Reports progress as `tracing` events.
#[derive(Debug)]
pub struct TracingMeter {
    started: Instant,
    steps: AtomicU64,
}

impl Default for TracingMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl TracingMeter {
    /// Creates a meter; elapsed time is measured from now.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            steps: AtomicU64::new(0),
        }
    }

    /// Returns the total units of work recorded so far.
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }
}

impl Meter for TracingMeter {
    fn step(&self, tag: &str, count: u64) {
        let total = self.steps.fetch_add(count, Ordering::Relaxed) + count;
        debug!(tag, count, total, "progress");
    }

    fn done(&self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        info!(elapsed_ms, steps = self.steps(), "build complete");
    }
}
