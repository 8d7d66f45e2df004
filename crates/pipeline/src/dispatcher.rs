//! Bounded pool running [`Worker`] jobs.
//!
//! At most `pool_size` jobs run at once; [`JobDispatcher::submit`] waits
//! for a free slot and then returns while the job runs in the background.
//! Each job runs in its own task, so a failing or panicking job never
//! affects the others. A job id already in flight is refused.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use harmonia_core::types::DbId;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::WorkerError;
use crate::worker::{JobRequest, Worker};

/// Default number of concurrently running jobs.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// How long in-flight jobs get after the drain deadline once cancelled.
const ABORT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub pool_size: usize,
    /// How long [`JobDispatcher::shutdown`] waits for in-flight jobs.
    pub drain_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Arrangement {0} is already being processed")]
    AlreadyInFlight(DbId),

    #[error("Dispatcher is shutting down")]
    ShuttingDown,
}

/// Removes a job id from the in-flight set when the job's task ends,
/// including by panic.
struct InFlightGuard {
    ids: Arc<Mutex<HashSet<DbId>>>,
    id: DbId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
    }
}

pub struct JobDispatcher {
    worker: Arc<Worker>,
    slots: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<DbId>>>,
    tracker: TaskTracker,
    abort: CancellationToken,
    config: DispatcherConfig,
}

impl JobDispatcher {
    pub fn new(worker: Worker, config: DispatcherConfig) -> Self {
        let pool_size = config.pool_size.max(1);
        tracing::info!(pool_size, "Job dispatcher started");
        Self {
            worker: Arc::new(worker),
            slots: Arc::new(Semaphore::new(pool_size)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            tracker: TaskTracker::new(),
            abort: CancellationToken::new(),
            config,
        }
    }

    /// Token cancelled when shutdown gives up waiting; hand it to the
    /// generation client so abandoned jobs stop polling.
    pub fn with_abort_token(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }

    /// Accept a job, waiting for a free slot if the pool is saturated.
    pub async fn submit(&self, job: JobRequest) -> Result<(), DispatchError> {
        let id = job.arrangement_id;
        if self.tracker.is_closed() {
            return Err(DispatchError::ShuttingDown);
        }
        if !self.lock_ids().insert(id) {
            tracing::warn!(arrangement_id = id, "Refusing duplicate dispatch");
            return Err(DispatchError::AlreadyInFlight(id));
        }
        let guard = InFlightGuard {
            ids: Arc::clone(&self.in_flight),
            id,
        };

        let permit = match Arc::clone(&self.slots).acquire_owned().await {
            Ok(permit) => permit,
            // The semaphore is closed only by shutdown.
            Err(_) => return Err(DispatchError::ShuttingDown),
        };

        let worker = Arc::clone(&self.worker);
        self.tracker.spawn(async move {
            let _permit = permit;
            let _guard = guard;
            match AssertUnwindSafe(worker.run(job)).catch_unwind().await {
                Ok(outcome) => {
                    tracing::debug!(arrangement_id = id, ?outcome, "Job finished");
                }
                Err(_) => {
                    tracing::error!(arrangement_id = id, "Job panicked");
                    worker.fail(id, &WorkerError::Panicked).await;
                }
            }
        });
        tracing::debug!(arrangement_id = id, "Job dispatched");
        Ok(())
    }

    /// Number of jobs accepted and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.lock_ids().len()
    }

    /// Free slots in the pool.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Stop accepting jobs and wait for in-flight ones.
    ///
    /// After `drain_timeout` the abort token is cancelled so remaining jobs
    /// wind down as FAILED. Returns `true` if every job finished in time.
    pub async fn shutdown(&self) -> bool {
        self.tracker.close();
        self.slots.close();
        let remaining = self.tracker.len();
        tracing::info!(remaining, "Job dispatcher draining");

        if tokio::time::timeout(self.config.drain_timeout, self.tracker.wait())
            .await
            .is_ok()
        {
            tracing::info!("Job dispatcher drained");
            return true;
        }

        tracing::warn!(
            remaining = self.tracker.len(),
            "Drain timed out, cancelling remaining jobs",
        );
        self.abort.cancel();
        if tokio::time::timeout(ABORT_GRACE, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::error!(remaining = self.tracker.len(), "Jobs still running at shutdown");
        }
        false
    }

    fn lock_ids(&self) -> std::sync::MutexGuard<'_, HashSet<DbId>> {
        // The set holds plain ids; a poisoned lock still holds a usable set.
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
