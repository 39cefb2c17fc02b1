//! Execution services and cancellable job handles.
//!
//! An [`ExecutionService`] only knows how to run a boxed closure somewhere.
//! [`submit`] layers result delivery, cancellation and panic capture on top,
//! returning a [`JobHandle`] that can be waited on with or without a timeout.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{BuildError, JobError};

/// A unit of work handed to an [`ExecutionService`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs, possibly on other threads.
pub trait ExecutionService: Send + Sync {
    /// Schedules `job` to run. Must not block waiting for it.
    fn spawn(&self, job: Job);
}

/// An execution service backed by a `rayon` thread pool.
pub struct ThreadPoolService {
    pool: rayon::ThreadPool,
}

impl ThreadPoolService {
    /// The fewest worker threads a pool is created with. A sequential build
    /// keeps one worker busy driving the others.
    pub const MIN_THREADS: usize = 2;

    /// Creates a pool with `threads` workers, raised to [`Self::MIN_THREADS`].
    pub fn new(threads: usize) -> Result<Self, BuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(Self::MIN_THREADS))
            .thread_name(|i| format!("kiln-worker-{i}"))
            .build()
            .map_err(|e| BuildError::Executor {
                reason: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    /// Returns the number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ExecutionService for ThreadPoolService {
    fn spawn(&self, job: Job) {
        self.pool.spawn(job);
    }
}

/// Shared flag a running job can poll to notice cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

type Outcome<T> = Result<T, JobError>;

struct Slot<T> {
    outcome: Mutex<Option<Outcome<T>>>,
    ready: Condvar,
}

impl<T> Slot<T> {
    fn lock(&self) -> MutexGuard<'_, Option<Outcome<T>>> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `outcome` unless one is already present. Returns whether it was stored.
    fn complete(&self, outcome: Outcome<T>) -> bool {
        let mut slot = self.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        self.ready.notify_all();
        true
    }
}

/// Completes the slot with [`JobError::Disconnected`] if the job is dropped
/// without running.
struct Completer<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        self.slot.complete(Err(JobError::Disconnected));
    }
}

/// Handle to a job started by [`submit`].
pub struct JobHandle<T> {
    slot: Arc<Slot<T>>,
    token: CancelToken,
}

/// Runs `job` on `service` and returns a handle to its result.
///
/// The job receives a [`CancelToken`] it may poll. A job cancelled before it
/// starts never runs. A panic inside the job is caught and reported as
/// [`JobError::Panicked`].
pub fn submit<T, F>(service: &dyn ExecutionService, job: F) -> JobHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&CancelToken) -> T + Send + 'static,
{
    let slot = Arc::new(Slot {
        outcome: Mutex::new(None),
        ready: Condvar::new(),
    });
    let token = CancelToken::new();

    let completer = Completer { slot: slot.clone() };
    let job_token = token.clone();
    service.spawn(Box::new(move || {
        if job_token.is_cancelled() {
            completer.slot.complete(Err(JobError::Cancelled));
            return;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&job_token))).map_err(|payload| {
            JobError::Panicked {
                message: panic_message(payload.as_ref()),
            }
        });
        completer.slot.complete(outcome);
    }));

    JobHandle { slot, token }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl<T: Clone> JobHandle<T> {
    /// Blocks until the job finishes or is cancelled.
    pub fn wait(&self) -> Outcome<T> {
        let guard = self.slot.lock();
        let guard = self
            .slot
            .ready
            .wait_while(guard, |outcome| outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        guard.clone().unwrap_or(Err(JobError::Disconnected))
    }

    /// Like [`Self::wait`], but gives up with [`JobError::Timeout`] after
    /// `timeout`. A timeout does not affect the job.
    pub fn wait_timeout(&self, timeout: Duration) -> Outcome<T> {
        let guard = self.slot.lock();
        let (guard, _) = self
            .slot
            .ready
            .wait_timeout_while(guard, timeout, |outcome| outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        guard.clone().unwrap_or(Err(JobError::Timeout))
    }

    /// Returns the outcome if the job has finished.
    pub fn try_get(&self) -> Option<Outcome<T>> {
        self.slot.lock().clone()
    }
}

impl<T> JobHandle<T> {
    /// Cancels the job. Returns `false` if it had already finished.
    ///
    /// Waiting on a cancelled handle returns [`JobError::Cancelled`] at once.
    /// A job that is already running is only told through its token.
    pub fn cancel(&self) -> bool {
        if self.slot.complete(Err(JobError::Cancelled)) {
            self.token.cancel();
            true
        } else {
            false
        }
    }

    /// Returns `true` if [`Self::cancel`] succeeded.
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.slot.lock(), Some(Err(JobError::Cancelled)))
    }

    /// Returns `true` once the job finished, failed or was cancelled.
    pub fn is_done(&self) -> bool {
        self.slot.lock().is_some()
    }
}
