//! Handle to an in-flight build.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::JobError;
use crate::executor::JobHandle;
use crate::meter::Meter;

/// Lifecycle of a build as seen through its handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildState {
    /// Submitted but not yet picked up by a worker.
    Idle,
    /// Executing tasks.
    Running,
    /// Every task succeeded.
    Completed,
    /// A task returned `false` or the build job faulted.
    Failed,
    /// Cancelled through the handle.
    Cancelled,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildState::Idle => "idle",
            BuildState::Running => "running",
            BuildState::Completed => "completed",
            BuildState::Failed => "failed",
            BuildState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Returned by [`crate::BuildProject::build`].
///
/// The meter's `done` is signalled the first time a successful result is
/// observed through the handle, and never more than once.
pub struct BuildHandle {
    job: JobHandle<bool>,
    meter: Arc<dyn Meter>,
    done_signalled: AtomicBool,
    started: Arc<AtomicBool>,
}

impl BuildHandle {
    pub(crate) fn new(job: JobHandle<bool>, meter: Arc<dyn Meter>, started: Arc<AtomicBool>) -> Self {
        Self {
            job,
            meter,
            done_signalled: AtomicBool::new(false),
            started,
        }
    }

    fn observe(&self, outcome: Result<bool, JobError>) -> Result<bool, JobError> {
        if outcome == Ok(true) && !self.done_signalled.swap(true, Ordering::AcqRel) {
            self.meter.done();
        }
        outcome
    }

    /// Blocks until the build finishes. `Ok(false)` means a task failed.
    pub fn wait(&self) -> Result<bool, JobError> {
        self.observe(self.job.wait())
    }

    /// Like [`Self::wait`], but returns [`JobError::Timeout`] after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, JobError> {
        self.observe(self.job.wait_timeout(timeout))
    }

    /// Cancels the build. Returns `false` if it had already finished.
    ///
    /// The task running at the time is allowed to finish; no further task
    /// starts.
    pub fn cancel(&self) -> bool {
        self.job.cancel()
    }

    /// Returns `true` if the build was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.job.is_cancelled()
    }

    /// Returns `true` once the build finished, failed or was cancelled.
    pub fn is_done(&self) -> bool {
        self.job.is_done()
    }

    /// Returns the current state without blocking.
    pub fn state(&self) -> BuildState {
        match self.job.try_get() {
            None if self.started.load(Ordering::Acquire) => BuildState::Running,
            None => BuildState::Idle,
            Some(Ok(true)) => BuildState::Completed,
            Some(Err(JobError::Cancelled)) => BuildState::Cancelled,
            Some(_) => BuildState::Failed,
        }
    }
}

impl fmt::Debug for BuildHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildHandle")
            .field("state", &self.state())
            .finish()
    }
}
