//! Periodic revalidation of idle entries

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use tracing::{trace, warn};

use crate::config::ValidationConfig;
use crate::entry::Entry;
use crate::errors::PoolResult;
use crate::interceptor::{check_entry, expire_if_aged};
use crate::metrics::MetricsTracker;
use crate::pool::{Pool, return_quietly};
use crate::scheduler::{Schedule, ScheduledTask, WorkerPool};

/// Sweeps the idle entries of a pool, expiring and validating each one
///
/// Every cycle borrows idle entries without creating new ones and hands each
/// to a worker, which applies age expiry, then validation if the entry is
/// still valid, and returns it. A cycle ends at the first entry it has
/// already seen, so it terminates after one lap even while validated
/// entries are put back behind it.
pub struct SweepLoop<T> {
    pool: Arc<dyn Pool<T>>,
    config: ValidationConfig,
    metrics: Arc<MetricsTracker>,
    task: ScheduledTask,
}

impl<T: Send + Sync + 'static> SweepLoop<T> {
    /// Create a sweep over `pool`, which should be the undecorated pool
    pub fn new(pool: Arc<dyn Pool<T>>, config: ValidationConfig) -> Self {
        Self::with_tracker(pool, config, Arc::default())
    }

    pub(crate) fn with_tracker(
        pool: Arc<dyn Pool<T>>,
        config: ValidationConfig,
        metrics: Arc<MetricsTracker>,
    ) -> Self {
        Self {
            pool,
            config,
            metrics,
            task: ScheduledTask::new("pool-sweep"),
        }
    }

    /// Start the sweep
    ///
    /// # Errors
    ///
    /// [`PoolError::AlreadyScheduled`](crate::PoolError::AlreadyScheduled) on
    /// the second call.
    pub fn schedule(&self) -> PoolResult<()> {
        let schedule = Schedule {
            initial_delay: self.config.test_initial_delay,
            interval: self.config.test_interval,
            threads: self.config.test_threads,
        };
        let checks = Arc::new(SweepChecks {
            max_age: self.config.max_age,
            metrics: Arc::clone(&self.metrics),
        });
        let pool = Arc::clone(&self.pool);

        self.task
            .schedule(schedule, move |workers| sweep_idle(&pool, &checks, workers))
    }
}

impl<T> SweepLoop<T> {
    pub fn is_scheduled(&self) -> bool {
        self.task.is_scheduled()
    }

    /// Stop scheduling further sweeps
    pub fn shutdown(&self) {
        self.task.shutdown();
    }
}

struct SweepChecks {
    max_age: Option<Duration>,
    metrics: Arc<MetricsTracker>,
}

impl SweepChecks {
    fn apply<T>(&self, entry: &Entry<T>) {
        if let Some(max_age) = self.max_age {
            expire_if_aged(max_age, entry, &self.metrics);
        }
        if entry.is_valid() && check_entry(entry, &self.metrics).is_err() {
            trace!(entry_id = entry.id(), "idle entry rejected by sweep");
        }
    }
}

/// Borrowed idle entry awaiting its checks
///
/// The entry goes back to the pool when the task is dropped, whether or not
/// it ever ran.
struct ValidateTask<T> {
    entry: Option<Entry<T>>,
    pool: Arc<dyn Pool<T>>,
    checks: Arc<SweepChecks>,
}

impl<T> ValidateTask<T> {
    fn run(self) {
        if let Some(entry) = &self.entry {
            self.checks.apply(entry);
        }
    }
}

impl<T> Drop for ValidateTask<T> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            return_quietly(&*self.pool, entry);
        }
    }
}

fn sweep_idle<T: Send + Sync + 'static>(
    pool: &Arc<dyn Pool<T>>,
    checks: &Arc<SweepChecks>,
    workers: &WorkerPool,
) {
    let seen = DashSet::with_capacity(pool.config().max_idle_entries);

    loop {
        let entry = match pool.try_borrow_entry(false) {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to borrow idle entry for validation");
                break;
            }
        };

        if !seen.insert(entry.id()) {
            return_quietly(&**pool, entry);
            break;
        }

        let task = ValidateTask {
            entry: Some(entry),
            pool: Arc::clone(pool),
            checks: Arc::clone(checks),
        };
        if !workers.submit(move || task.run()) {
            break;
        }
    }

    trace!(swept = seen.len(), "validation sweep finished");
}
