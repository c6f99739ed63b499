//! Pooled entries and their validity state

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::errors::BoxError;

/// Shared handle to a pooled entry
///
/// Entries travel between the idle queue, borrowers and background tasks by
/// handle; two handles refer to the same entry when their [`PoolEntry::id`]s match.
pub type Entry<T> = Arc<PoolEntry<T>>;

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Health check and disposal hooks for pooled objects
pub trait ObjectValidator<T>: Send + Sync {
    /// Check whether `object` is still usable
    fn validate(&self, object: &T) -> Result<bool, BoxError>;

    /// Release whatever `object` holds outside of its own `Drop`
    fn invalidate(&self, object: &T) -> Result<(), BoxError>;
}

/// Validator that accepts every object and has no disposal step
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopValidator;

impl<T> ObjectValidator<T> for NoopValidator {
    fn validate(&self, _object: &T) -> Result<bool, BoxError> {
        Ok(true)
    }

    fn invalidate(&self, _object: &T) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Validity record of a single entry
///
/// `valid` is a one-way latch: it can go from `true` to `false` but never back.
#[derive(Debug)]
pub struct EntryState {
    valid: AtomicBool,
    created_at: Instant,
    // nanoseconds after `created_at`
    validated_offset: AtomicU64,
}

impl EntryState {
    fn new() -> Self {
        Self {
            valid: AtomicBool::new(true),
            created_at: Instant::now(),
            validated_offset: AtomicU64::new(0),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time of the last successful validation, or creation time if none
    pub fn last_validated_at(&self) -> Instant {
        self.created_at + Duration::from_nanos(self.validated_offset.load(Ordering::Acquire))
    }

    /// Move `valid` from `true` to `outcome`; fails if the entry was invalidated meanwhile
    fn settle(&self, outcome: bool) -> bool {
        self.valid
            .compare_exchange(true, outcome, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn mark_validated(&self) {
        let offset = u64::try_from(self.created_at.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.validated_offset.fetch_max(offset, Ordering::AcqRel);
    }
}

/// A pooled object together with its validity state and validator
pub struct PoolEntry<T> {
    id: u64,
    object: T,
    state: EntryState,
    validator: Arc<dyn ObjectValidator<T>>,
}

impl<T> PoolEntry<T> {
    /// Wrap `object` in a new, valid entry
    pub fn new(object: T, validator: Arc<dyn ObjectValidator<T>>) -> Self {
        Self {
            id: NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed),
            object,
            state: EntryState::new(),
            validator,
        }
    }

    /// Process-unique identity of this entry
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn object(&self) -> &T {
        &self.object
    }

    pub fn state(&self) -> &EntryState {
        &self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state.is_valid()
    }

    /// Time elapsed since the entry was created
    pub fn age(&self) -> Duration {
        self.state.created_at.elapsed()
    }

    /// Run the validator and record its verdict
    ///
    /// Returns `Ok(false)` without calling the validator when the entry is
    /// already invalid. A `true` verdict only counts if no one invalidated
    /// the entry while the validator ran.
    ///
    /// # Errors
    ///
    /// Validator errors are returned unchanged and leave the state untouched.
    pub fn validate(&self) -> Result<bool, BoxError> {
        if !self.state.is_valid() {
            return Ok(false);
        }

        let outcome = self.validator.validate(&self.object)?;
        let settled = self.state.settle(outcome);

        if outcome && settled {
            self.state.mark_validated();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Mark the entry invalid and run the disposal hook
    ///
    /// Only the first caller to flip the state runs the hook, so disposal
    /// happens at most once however many threads race here.
    ///
    /// # Errors
    ///
    /// Disposal errors are returned to the caller that ran the hook.
    pub fn invalidate(&self) -> Result<(), BoxError> {
        if self.state.settle(false) {
            trace!(entry_id = self.id, "invalidating pool entry");
            self.validator.invalidate(&self.object)?;
        }
        Ok(())
    }
}

impl<T> Deref for PoolEntry<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl<T> fmt::Debug for PoolEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolEntry")
            .field("id", &self.id)
            .field("valid", &self.is_valid())
            .field("age", &self.age())
            .finish()
    }
}
