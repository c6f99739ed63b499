//! Validation pipeline decorating a pool with interceptors

use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::{PoolConfig, ValidationConfig};
use crate::entry::Entry;
use crate::errors::{PoolError, PoolResult};
use crate::interceptor::{
    AgeExpiryInterceptor, BorrowContext, OnDemandValidationInterceptor, PoolInterceptor, Verdict,
};
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::pool::{Pool, return_quietly};
use crate::queue::invalidate_quietly;
use crate::sweep::SweepLoop;

/// Pool decorator applying validation policy around a wrapped pool
///
/// Borrow-side hooks run in registration order once the wrapped pool has
/// handed out an entry. An entry an interceptor discards goes back to the
/// wrapped pool and another one is borrowed within what is left of the
/// borrow's time budget. An interceptor error also sends the entry back,
/// then fails the borrow. A replacement entry is what the next interceptor
/// sees; the one it displaced goes back to the wrapped pool.
///
/// Return-side hooks run in the same order; the entry reaches the wrapped
/// pool even when one of them fails or panics.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{
///     BoxError, CorePool, NoopValidator, Pool, PoolConfig, ValidatingPool, ValidationConfig,
/// };
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let core: Arc<dyn Pool<String>> = Arc::new(CorePool::new(
///     PoolConfig::new().with_max_active_entries(4),
///     Arc::new(|| Ok::<_, BoxError>(String::from("session"))),
///     Arc::new(NoopValidator),
/// ).unwrap());
///
/// let pool = ValidatingPool::new(
///     core,
///     ValidationConfig::new()
///         .with_test_on_borrow(true)
///         .with_max_age(Duration::from_secs(300)),
/// ).unwrap();
///
/// let entry = pool.borrow().unwrap().unwrap();
/// assert_eq!(entry.as_str(), "session");
/// pool.return_entry(Some(entry)).unwrap();
/// ```
pub struct ValidatingPool<T> {
    inner: Arc<dyn Pool<T>>,
    config: ValidationConfig,
    interceptors: Vec<Box<dyn PoolInterceptor<T>>>,
    metrics: Arc<MetricsTracker>,
    sweep: SweepLoop<T>,
}

impl<T: Send + Sync + 'static> ValidatingPool<T> {
    /// Wrap `inner` with the interceptors `config` asks for
    ///
    /// Age expiry comes first when `max_age` is set, followed by on-demand
    /// validation when testing on borrow or return. Starts the background
    /// sweep when `test_in_background` is set.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidConfig`] when `config` does not validate,
    /// [`PoolError::ThreadSpawn`] when the sweep cannot be started.
    pub fn new(inner: Arc<dyn Pool<T>>, config: ValidationConfig) -> PoolResult<Self> {
        let metrics = Arc::new(MetricsTracker::new());
        let mut interceptors: Vec<Box<dyn PoolInterceptor<T>>> = Vec::new();

        if let Some(max_age) = config.max_age {
            interceptors.push(Box::new(AgeExpiryInterceptor::with_tracker(
                max_age,
                Arc::clone(&metrics),
            )));
        }
        if config.test_on_borrow || config.test_on_return {
            interceptors.push(Box::new(OnDemandValidationInterceptor::with_tracker(
                config.test_on_borrow,
                config.test_on_return,
                Arc::clone(&metrics),
            )));
        }

        Self::assemble(inner, config, interceptors, metrics)
    }

    /// Wrap `inner` with a custom interceptor chain
    ///
    /// `config` still drives the background sweep.
    ///
    /// # Errors
    ///
    /// As [`ValidatingPool::new`].
    pub fn with_interceptors(
        inner: Arc<dyn Pool<T>>,
        config: ValidationConfig,
        interceptors: Vec<Box<dyn PoolInterceptor<T>>>,
    ) -> PoolResult<Self> {
        Self::assemble(inner, config, interceptors, Arc::new(MetricsTracker::new()))
    }

    fn assemble(
        inner: Arc<dyn Pool<T>>,
        config: ValidationConfig,
        interceptors: Vec<Box<dyn PoolInterceptor<T>>>,
        metrics: Arc<MetricsTracker>,
    ) -> PoolResult<Self> {
        config.validate()?;
        // the sweep works on the wrapped pool so borrow hooks do not run twice
        let sweep =
            SweepLoop::with_tracker(Arc::clone(&inner), config.clone(), Arc::clone(&metrics));

        let pool = Self {
            inner,
            config,
            interceptors,
            metrics,
            sweep,
        };
        if pool.config.test_in_background {
            pool.sweep.schedule()?;
        }
        Ok(pool)
    }

    /// Start the background sweep
    ///
    /// # Errors
    ///
    /// [`PoolError::AlreadyScheduled`] when the sweep is already running,
    /// including when `test_in_background` started it at construction.
    /// [`PoolError::Closed`] after [`ValidatingPool::stop_background_validation`].
    pub fn schedule_background_validation(&self) -> PoolResult<()> {
        self.sweep.schedule()
    }

    /// Borrow from the wrapped pool until an entry survives every interceptor
    fn borrow_with<F>(
        &self,
        create_if_empty: bool,
        timeout: Option<Duration>,
        mut borrow: F,
    ) -> PoolResult<Option<Entry<T>>>
    where
        F: FnMut(Duration) -> PoolResult<Option<Entry<T>>>,
    {
        let started = Instant::now();
        // expired entries are disposed on discard, so one lap over the idle ones is enough
        let attempts = self.inner.config().max_idle_entries + 1;

        for _ in 0..attempts {
            let remaining = timeout.map_or(Duration::ZERO, |t| t.saturating_sub(started.elapsed()));
            let Some(entry) = borrow(remaining)? else {
                return Ok(None);
            };

            let context = BorrowContext {
                create_if_empty,
                elapsed: started.elapsed(),
                timeout,
            };
            if let Some(entry) = self.intercept_borrow(entry, &context)? {
                return Ok(Some(entry));
            }
        }

        debug!(attempts, "every borrowed entry was discarded");
        Ok(None)
    }

    fn intercept_borrow(
        &self,
        entry: Entry<T>,
        context: &BorrowContext,
    ) -> PoolResult<Option<Entry<T>>> {
        // on an error or a panic the guard gives the entry back to the wrapped pool
        let mut chained = ChainedEntry::new(&*self.inner, entry);
        for interceptor in &self.interceptors {
            match interceptor.after_borrow(chained.entry(), context)? {
                Verdict::Keep => {}
                Verdict::Discard => return Ok(None),
                Verdict::Replace(replacement) => chained.replace(replacement),
            }
        }
        Ok(Some(chained.take()))
    }

    fn intercept_return(&self, chained: &mut ChainedEntry<'_, T>) -> PoolResult<()> {
        for interceptor in &self.interceptors {
            match interceptor.before_return(chained.entry())? {
                Verdict::Keep => {}
                Verdict::Discard => {
                    invalidate_quietly(chained.entry());
                    break;
                }
                Verdict::Replace(replacement) => chained.replace(replacement),
            }
        }
        Ok(())
    }
}

impl<T> ValidatingPool<T> {
    pub fn validation_config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Stop the background sweep, if running
    pub fn stop_background_validation(&self) {
        self.sweep.shutdown();
    }
}

impl<T: Send + Sync + 'static> Pool<T> for ValidatingPool<T> {
    fn config(&self) -> &PoolConfig {
        self.inner.config()
    }

    fn borrow_entry(
        &self,
        create_if_empty: bool,
        timeout: Duration,
    ) -> PoolResult<Option<Entry<T>>> {
        self.borrow_with(create_if_empty, Some(timeout), |remaining| {
            self.inner
                .borrow_entry(create_if_empty, remaining)
                .map_err(|e| match e {
                    PoolError::Timeout(_) => PoolError::Timeout(timeout),
                    e => e,
                })
        })
    }

    fn try_borrow_entry(&self, create_if_empty: bool) -> PoolResult<Option<Entry<T>>> {
        self.borrow_with(create_if_empty, None, |_| {
            self.inner.try_borrow_entry(create_if_empty)
        })
    }

    fn return_entry(&self, entry: Option<Entry<T>>) -> PoolResult<()> {
        let entry = entry.ok_or(PoolError::InvalidArgument("entry is absent"))?;
        let mut chained = ChainedEntry::new(&*self.inner, entry);
        let outcome = self.intercept_return(&mut chained);

        self.inner.return_entry(Some(chained.take()))?;
        outcome
    }

    fn available_permits(&self) -> usize {
        self.inner.available_permits()
    }

    fn idle_count(&self) -> usize {
        self.inner.idle_count()
    }

    fn metrics(&self) -> PoolMetrics {
        let mut metrics = self.inner.metrics();
        self.metrics.add_validation_counts(&mut metrics);
        metrics
    }
}

/// Entry travelling through the interceptor chain
///
/// Goes back to the wrapped pool when dropped, unwinding included, unless it
/// was taken out with [`ChainedEntry::take`].
struct ChainedEntry<'a, T> {
    pool: &'a dyn Pool<T>,
    entry: Entry<T>,
    armed: bool,
}

impl<'a, T> ChainedEntry<'a, T> {
    fn new(pool: &'a dyn Pool<T>, entry: Entry<T>) -> Self {
        Self {
            pool,
            entry,
            armed: true,
        }
    }

    fn entry(&self) -> &Entry<T> {
        &self.entry
    }

    /// Swap in `replacement`, returning the displaced entry to the pool
    fn replace(&mut self, replacement: Entry<T>) {
        if Arc::ptr_eq(&self.entry, &replacement) {
            return;
        }
        let displaced = mem::replace(&mut self.entry, replacement);
        debug!(
            displaced = displaced.id(),
            replacement = self.entry.id(),
            "interceptor replaced pool entry"
        );
        return_quietly(self.pool, displaced);
    }

    fn take(mut self) -> Entry<T> {
        self.armed = false;
        Arc::clone(&self.entry)
    }
}

impl<T> Drop for ChainedEntry<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            return_quietly(self.pool, Arc::clone(&self.entry));
        }
    }
}
