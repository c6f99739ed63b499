//! Borrow/return interceptors layering validation policy onto a pool

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::entry::Entry;
use crate::errors::{PoolError, PoolResult};
use crate::metrics::MetricsTracker;
use crate::queue::invalidate_quietly;

/// Details of the borrow an interceptor is looking at
#[derive(Debug, Clone, Copy)]
pub struct BorrowContext {
    /// Whether the borrow was allowed to create a new entry
    pub create_if_empty: bool,

    /// Time spent in the borrow so far
    pub elapsed: Duration,

    /// Time budget of the borrow; `None` for non-blocking borrows
    pub timeout: Option<Duration>,
}

/// What the pipeline does with the entry an interceptor has just looked at
#[derive(Debug)]
pub enum Verdict<T> {
    /// Hand the entry on to the next interceptor unchanged
    Keep,

    /// Take the entry out of the chain
    ///
    /// On borrow the entry goes back to the wrapped pool and another one is
    /// borrowed. On return it is disposed instead of idled and the remaining
    /// hooks are skipped.
    Discard,

    /// Continue the chain with another entry
    ///
    /// The displaced entry goes back to the wrapped pool. The replacement
    /// must hold an admission unit of the wrapped pool, which is the case for
    /// any entry borrowed from it.
    Replace(Entry<T>),
}

/// Hook pair run around every borrow and return of a [`ValidatingPool`](crate::ValidatingPool)
///
/// Interceptors see the entry by reference and steer it with a [`Verdict`].
/// The pool keeps ownership, so whatever an interceptor answers (or if it
/// panics), each entry ends up either with the caller or back in the
/// wrapped pool.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{BorrowContext, Entry, PoolInterceptor, PoolResult, Verdict};
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// #[derive(Default)]
/// struct BorrowCounter(AtomicU64);
///
/// impl<T> PoolInterceptor<T> for BorrowCounter {
///     fn after_borrow(
///         &self,
///         _entry: &Entry<T>,
///         _context: &BorrowContext,
///     ) -> PoolResult<Verdict<T>> {
///         self.0.fetch_add(1, Ordering::Relaxed);
///         Ok(Verdict::Keep)
///     }
/// }
/// ```
pub trait PoolInterceptor<T>: Send + Sync {
    /// Inspect an entry after the wrapped pool handed it out
    ///
    /// # Errors
    ///
    /// An error aborts the borrow; the entry goes back to the wrapped pool and
    /// the error reaches the caller.
    fn after_borrow(&self, _entry: &Entry<T>, _context: &BorrowContext) -> PoolResult<Verdict<T>> {
        Ok(Verdict::Keep)
    }

    /// Inspect an entry before it is given back to the wrapped pool
    ///
    /// # Errors
    ///
    /// The remaining hooks are skipped and the entry is returned to the
    /// wrapped pool regardless; the error is passed on to the caller
    /// afterwards.
    fn before_return(&self, _entry: &Entry<T>) -> PoolResult<Verdict<T>> {
        Ok(Verdict::Keep)
    }
}

/// Invalidates entries older than a maximum age
///
/// Age counts from the entry's creation, successful validations do not
/// reset it. Expired entries found on borrow are discarded so the pool can
/// hand out another one; on return they are disposed instead of idled.
pub struct AgeExpiryInterceptor {
    max_age: Duration,
    metrics: Arc<MetricsTracker>,
}

impl AgeExpiryInterceptor {
    pub fn new(max_age: Duration) -> Self {
        Self::with_tracker(max_age, Arc::default())
    }

    pub(crate) fn with_tracker(max_age: Duration, metrics: Arc<MetricsTracker>) -> Self {
        Self { max_age, metrics }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

impl<T> PoolInterceptor<T> for AgeExpiryInterceptor {
    fn after_borrow(&self, entry: &Entry<T>, _context: &BorrowContext) -> PoolResult<Verdict<T>> {
        if expire_if_aged(self.max_age, entry, &self.metrics) {
            Ok(Verdict::Discard)
        } else {
            Ok(Verdict::Keep)
        }
    }

    fn before_return(&self, entry: &Entry<T>) -> PoolResult<Verdict<T>> {
        // the expired entry still flows on so the base return releases its unit
        expire_if_aged(self.max_age, entry, &self.metrics);
        Ok(Verdict::Keep)
    }
}

/// Runs the entry's validator on borrow and/or on return
///
/// A rejected borrow fails with [`PoolError::ValidationFailed`]. A rejected
/// return is not an error for the caller: the entry is simply not idled.
pub struct OnDemandValidationInterceptor {
    test_on_borrow: bool,
    test_on_return: bool,
    metrics: Arc<MetricsTracker>,
}

impl OnDemandValidationInterceptor {
    pub fn new(test_on_borrow: bool, test_on_return: bool) -> Self {
        Self::with_tracker(test_on_borrow, test_on_return, Arc::default())
    }

    pub(crate) fn with_tracker(
        test_on_borrow: bool,
        test_on_return: bool,
        metrics: Arc<MetricsTracker>,
    ) -> Self {
        Self {
            test_on_borrow,
            test_on_return,
            metrics,
        }
    }
}

impl<T> PoolInterceptor<T> for OnDemandValidationInterceptor {
    fn after_borrow(&self, entry: &Entry<T>, _context: &BorrowContext) -> PoolResult<Verdict<T>> {
        if self.test_on_borrow {
            check_entry(entry, &self.metrics)?;
        }
        Ok(Verdict::Keep)
    }

    fn before_return(&self, entry: &Entry<T>) -> PoolResult<Verdict<T>> {
        // entries already invalidated further up the chain are not counted twice
        if self.test_on_return && entry.is_valid() && check_entry(entry, &self.metrics).is_err() {
            debug!(entry_id = entry.id(), "returned entry failed validation");
        }
        Ok(Verdict::Keep)
    }
}

/// Invalidate `entry` if it is still valid and older than `max_age`
///
/// Returns whether the entry expired.
pub(crate) fn expire_if_aged<T>(
    max_age: Duration,
    entry: &Entry<T>,
    metrics: &MetricsTracker,
) -> bool {
    let age = entry.age();
    if !entry.is_valid() || age <= max_age {
        return false;
    }

    debug!(entry_id = entry.id(), ?age, ?max_age, "pool entry expired");
    invalidate_quietly(entry);
    MetricsTracker::increment(&metrics.expired_entries);
    true
}

/// Validate `entry`, turning a negative verdict into [`PoolError::ValidationFailed`]
///
/// A validator error counts as a failed validation and also disposes the
/// entry, since its state is unknown.
pub(crate) fn check_entry<T>(entry: &Entry<T>, metrics: &MetricsTracker) -> PoolResult<()> {
    match entry.validate() {
        Ok(true) => Ok(()),
        Ok(false) => {
            debug!(entry_id = entry.id(), "pool entry failed validation");
            MetricsTracker::increment(&metrics.validation_failures);
            Err(PoolError::ValidationFailed(None))
        }
        Err(e) => {
            warn!(entry_id = entry.id(), error = %e, "validator failed, invalidating pool entry");
            invalidate_quietly(entry);
            MetricsTracker::increment(&metrics.validation_failures);
            Err(PoolError::ValidationFailed(Some(e)))
        }
    }
}
