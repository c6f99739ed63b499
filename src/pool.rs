//! Borrow/return contract and the capacity-gated core pool

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::config::PoolConfig;
use crate::entry::{Entry, ObjectValidator};
use crate::ensure::EnsureLoop;
use crate::errors::{PoolError, PoolResult};
use crate::factory::{EntryFactory, ObjectFactory};
use crate::gate::{AdmissionGate, PermitGuard};
use crate::health::HealthStatus;
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::queue::IdleQueue;

/// Borrow/return contract shared by the core pool and its decorators
///
/// Every entry obtained from `borrow_entry` or `try_borrow_entry` holds one
/// admission unit until it is handed back through `return_entry`. An entry
/// that is never returned keeps its unit forever, so callers must return
/// entries on every path, error paths included.
pub trait Pool<T>: Send + Sync {
    fn config(&self) -> &PoolConfig;

    /// Borrow an entry, waiting up to `timeout` for capacity
    ///
    /// Returns `Ok(None)` when no idle entry exists and `create_if_empty` is
    /// `false`.
    ///
    /// # Errors
    ///
    /// [`PoolError::Timeout`] when no capacity frees up in time,
    /// [`PoolError::CreationFailed`] when a new entry could not be created,
    /// [`PoolError::Closed`] / [`PoolError::Interrupted`] once the pool is closed.
    fn borrow_entry(
        &self,
        create_if_empty: bool,
        timeout: Duration,
    ) -> PoolResult<Option<Entry<T>>>;

    /// Borrow an entry without waiting; `Ok(None)` when no capacity is free
    ///
    /// # Errors
    ///
    /// As [`Pool::borrow_entry`], minus the timeout.
    fn try_borrow_entry(&self, create_if_empty: bool) -> PoolResult<Option<Entry<T>>>;

    /// Hand a borrowed entry back and release its admission unit
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] when `entry` is `None`.
    fn return_entry(&self, entry: Option<Entry<T>>) -> PoolResult<()>;

    /// Free admission units; for diagnostics and tests
    fn available_permits(&self) -> usize;

    /// Idle entries; for diagnostics and tests
    fn idle_count(&self) -> usize;

    fn metrics(&self) -> PoolMetrics;

    /// Borrow with lazy creation and the configured default deadline
    fn borrow(&self) -> PoolResult<Option<Entry<T>>> {
        self.borrow_entry(true, self.config().max_wait_on_borrow)
    }

    /// Borrow with lazy creation, without waiting
    fn try_borrow(&self) -> PoolResult<Option<Entry<T>>> {
        self.try_borrow_entry(true)
    }

    /// Entries currently borrowed
    fn active_count(&self) -> usize {
        self.config()
            .max_active_entries
            .saturating_sub(self.available_permits())
    }

    fn health_status(&self) -> HealthStatus {
        HealthStatus::new(
            self.idle_count(),
            self.active_count(),
            self.config().max_active_entries,
        )
    }
}

/// Give `entry` back to `pool`, logging instead of returning errors
pub(crate) fn return_quietly<T, P: Pool<T> + ?Sized>(pool: &P, entry: Entry<T>) {
    let entry_id = entry.id();
    if let Err(e) = pool.return_entry(Some(entry)) {
        warn!(entry_id, error = %e, "failed to return pool entry");
    }
}

/// Pool handing out entries under an admission limit
///
/// Creates entries lazily, keeps returned ones in a bounded idle queue and
/// disposes whatever does not fit. The core pool never validates entries
/// itself; wrap it in a [`ValidatingPool`](crate::ValidatingPool) for that.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{BoxError, CorePool, NoopValidator, Pool, PoolConfig};
/// use std::sync::Arc;
///
/// let config = PoolConfig::new().with_max_active_entries(1);
/// let pool = CorePool::new(
///     config,
///     Arc::new(|| Ok::<_, BoxError>(vec![0u8; 1024])),
///     Arc::new(NoopValidator),
/// ).unwrap();
///
/// let entry = pool.borrow().unwrap().unwrap();
/// assert_eq!(entry.len(), 1024);
/// assert!(pool.try_borrow().unwrap().is_none());
///
/// pool.return_entry(Some(entry)).unwrap();
/// assert_eq!(pool.idle_count(), 1);
/// ```
pub struct CorePool<T> {
    config: PoolConfig,
    queue: Arc<IdleQueue<T>>,
    factory: Arc<EntryFactory<T>>,
    gate: AdmissionGate,
    metrics: MetricsTracker,
    ensure: EnsureLoop<T>,
}

impl<T: Send + Sync + 'static> CorePool<T> {
    /// Create a pool from an object factory and validator
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidConfig`] when `config` does not validate.
    pub fn new(
        config: PoolConfig,
        object_factory: Arc<dyn ObjectFactory<T>>,
        validator: Arc<dyn ObjectValidator<T>>,
    ) -> PoolResult<Self> {
        let factory = Arc::new(EntryFactory::new(object_factory, validator));
        Self::with_entry_factory(config, factory)
    }

    /// Create a pool around an existing entry factory
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidConfig`] when `config` does not validate.
    pub fn with_entry_factory(
        config: PoolConfig,
        factory: Arc<EntryFactory<T>>,
    ) -> PoolResult<Self> {
        config.validate()?;
        let queue = Arc::new(IdleQueue::new(config.max_idle_entries));
        let ensure = EnsureLoop::new(config.clone(), Arc::clone(&queue), Arc::clone(&factory));

        Ok(Self {
            gate: AdmissionGate::new(config.max_active_entries),
            config,
            queue,
            factory,
            metrics: MetricsTracker::new(),
            ensure,
        })
    }

    /// Start topping up idle entries in the background
    ///
    /// # Errors
    ///
    /// [`PoolError::AlreadyScheduled`] when called more than once,
    /// [`PoolError::Closed`] once the pool is closed.
    pub fn schedule_ensure(&self) -> PoolResult<()> {
        self.ensure.schedule()
    }

    /// Close the pool
    ///
    /// Blocked borrowers fail with [`PoolError::Interrupted`], later borrows
    /// with [`PoolError::Closed`]. Idle entries are invalidated, and entries
    /// returned afterwards are invalidated instead of idled.
    pub fn close(&self) {
        if self.gate.close() {
            self.ensure.shutdown();
            let disposed = self.queue.close();
            debug!(disposed, "pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }

    /// Second half of a borrow, run while holding an admission unit
    fn take_idle_or_create(&self, create_if_empty: bool) -> PoolResult<Option<Entry<T>>> {
        let permit = PermitGuard(&self.gate);

        if let Some(entry) = self.queue.poll() {
            trace!(entry_id = entry.id(), "borrowed idle entry");
            MetricsTracker::increment(&self.metrics.total_borrowed);
            permit.keep();
            return Ok(Some(entry));
        }

        if !create_if_empty {
            MetricsTracker::increment(&self.metrics.pool_empty_events);
            return Ok(None);
        }

        match self.factory.create() {
            Ok(entry) => {
                trace!(entry_id = entry.id(), "borrowed new entry");
                MetricsTracker::increment(&self.metrics.total_created);
                MetricsTracker::increment(&self.metrics.total_borrowed);
                permit.keep();
                Ok(Some(entry))
            }
            Err(e) => {
                MetricsTracker::increment(&self.metrics.creation_failures);
                Err(PoolError::CreationFailed(e))
            }
        }
    }
}

impl<T: Send + Sync + 'static> Pool<T> for CorePool<T> {
    fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn borrow_entry(
        &self,
        create_if_empty: bool,
        timeout: Duration,
    ) -> PoolResult<Option<Entry<T>>> {
        if let Err(e) = self.gate.acquire(timeout) {
            if matches!(e, PoolError::Timeout(_)) {
                MetricsTracker::increment(&self.metrics.borrow_timeouts);
            }
            return Err(e);
        }
        self.take_idle_or_create(create_if_empty)
    }

    fn try_borrow_entry(&self, create_if_empty: bool) -> PoolResult<Option<Entry<T>>> {
        if !self.gate.try_acquire()? {
            return Ok(None);
        }
        self.take_idle_or_create(create_if_empty)
    }

    fn return_entry(&self, entry: Option<Entry<T>>) -> PoolResult<()> {
        let entry = entry.ok_or(PoolError::InvalidArgument("entry is absent"))?;
        let _permit = PermitGuard(&self.gate);
        MetricsTracker::increment(&self.metrics.total_returned);

        let entry_id = entry.id();
        if !self.queue.offer(Some(entry))? {
            trace!(entry_id, "returned entry not kept idle");
        }
        Ok(())
    }

    fn available_permits(&self) -> usize {
        self.gate.available_permits()
    }

    fn idle_count(&self) -> usize {
        self.queue.len()
    }

    fn metrics(&self) -> PoolMetrics {
        self.metrics.get_metrics(
            self.active_count(),
            self.queue.len(),
            self.gate.max_permits(),
        )
    }
}

impl<T> Drop for CorePool<T> {
    fn drop(&mut self) {
        if self.gate.close() {
            self.ensure.shutdown();
            self.queue.close();
        }
    }
}
