//! Bounded queue of idle entries

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::queue::ArrayQueue;
use tracing::{debug, warn};

use crate::entry::Entry;
use crate::errors::{PoolError, PoolResult};

/// Idle entries waiting to be borrowed
///
/// The capacity is enforced here rather than on return: an entry that does
/// not fit is invalidated on the spot, so the number of idle resources never
/// exceeds the configured maximum.
pub struct IdleQueue<T> {
    entries: ArrayQueue<Entry<T>>,
    closed: AtomicBool,
}

impl<T> IdleQueue<T> {
    /// Create an empty queue holding at most `capacity` entries
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; [`PoolConfig::validate`](crate::PoolConfig::validate)
    /// rejects such configurations.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: ArrayQueue::new(capacity),
            closed: AtomicBool::new(false),
        }
    }

    /// Put an entry into the queue
    ///
    /// Returns `Ok(false)` when the entry is invalid, the queue is full or
    /// closed. In the last two cases the entry is invalidated before
    /// returning; disposal errors are logged, never returned.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] when `entry` is `None`.
    pub fn offer(&self, entry: Option<Entry<T>>) -> PoolResult<bool> {
        let entry = entry.ok_or(PoolError::InvalidArgument("entry is absent"))?;
        if !entry.is_valid() {
            return Ok(false);
        }
        if self.is_closed() {
            invalidate_quietly(&entry);
            return Ok(false);
        }

        match self.entries.push(entry) {
            Ok(()) => {
                if self.is_closed() {
                    // raced with close(); nothing may stay idle
                    self.drain_and_invalidate();
                    return Ok(false);
                }
                Ok(true)
            }
            Err(rejected) => {
                debug!(entry_id = rejected.id(), "idle queue full, disposing entry");
                invalidate_quietly(&rejected);
                Ok(false)
            }
        }
    }

    /// Take the oldest idle entry, if any
    pub fn poll(&self) -> Option<Entry<T>> {
        self.entries.pop()
    }

    /// Number of idle entries; only a snapshot under concurrent use
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// How many entries are missing to reach `target` (capped at capacity)
    pub fn shortfall(&self, target: usize) -> usize {
        target.min(self.capacity()).saturating_sub(self.len())
    }

    /// Stop accepting entries and dispose the idle ones, returning how many were disposed
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        self.drain_and_invalidate()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Remove and invalidate every idle entry, returning how many were removed
    pub fn drain_and_invalidate(&self) -> usize {
        let mut drained = 0;
        while let Some(entry) = self.entries.pop() {
            invalidate_quietly(&entry);
            drained += 1;
        }
        drained
    }
}

/// Invalidate an entry, logging instead of returning disposal errors
pub(crate) fn invalidate_quietly<T>(entry: &Entry<T>) {
    if let Err(e) = entry.invalidate() {
        warn!(entry_id = entry.id(), error = %e, "failed to invalidate pool entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::testing::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_offer_absent_entry() {
        let queue: IdleQueue<u32> = IdleQueue::new(1);
        assert!(matches!(
            queue.offer(None),
            Err(PoolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_offer_valid_entry() {
        let queue = IdleQueue::new(1);
        let entry = plain_entry();

        assert!(queue.offer(Some(Arc::clone(&entry))).unwrap());
        assert!(entry.is_valid());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_offer_invalid_entry() {
        let queue = IdleQueue::new(1);
        let entry = plain_entry();
        entry.invalidate().unwrap();

        assert!(!queue.offer(Some(entry)).unwrap());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_offer_beyond_capacity() {
        let queue = IdleQueue::new(1);
        let first = plain_entry();
        let second = plain_entry();

        assert!(queue.offer(Some(Arc::clone(&first))).unwrap());
        assert!(!queue.offer(Some(Arc::clone(&second))).unwrap());

        assert!(first.is_valid());
        assert!(!second.is_valid());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.poll().unwrap().id(), first.id());
    }

    #[test]
    fn test_offer_beyond_capacity_with_failing_dispose() {
        let validator = Arc::new(SpyValidator::failing_dispose());
        let queue = IdleQueue::new(1);
        let first = entry_with(&validator);
        let second = entry_with(&validator);

        assert!(queue.offer(Some(Arc::clone(&first))).unwrap());
        assert!(!queue.offer(Some(Arc::clone(&second))).unwrap());

        assert!(first.is_valid());
        assert!(!second.is_valid());
        assert_eq!(validator.invalidate_calls(), 1);
    }

    #[test]
    fn test_poll_empty_and_non_empty() {
        let queue = IdleQueue::new(2);
        assert!(queue.poll().is_none());

        queue.offer(Some(plain_entry())).unwrap();
        assert!(queue.poll().is_some());
    }

    #[test]
    fn test_shortfall_capped_by_capacity() {
        let queue = IdleQueue::new(3);
        queue.offer(Some(plain_entry())).unwrap();

        assert_eq!(queue.shortfall(2), 1);
        assert_eq!(queue.shortfall(10), 2);
        assert_eq!(queue.shortfall(0), 0);
    }

    #[test]
    fn test_drain_invalidates_everything() {
        let queue = IdleQueue::new(3);
        let entries: Vec<_> = (0..3).map(|_| plain_entry()).collect();
        for entry in &entries {
            queue.offer(Some(Arc::clone(entry))).unwrap();
        }

        assert_eq!(queue.drain_and_invalidate(), 3);
        assert!(queue.is_empty());
        assert!(entries.iter().all(|e| !e.is_valid()));
    }

    #[test]
    fn test_closed_queue_disposes_offers() {
        let queue = IdleQueue::new(2);
        let idle = plain_entry();
        queue.offer(Some(Arc::clone(&idle))).unwrap();

        assert_eq!(queue.close(), 1);
        assert!(!idle.is_valid());

        let late = plain_entry();
        assert!(!queue.offer(Some(Arc::clone(&late))).unwrap());
        assert!(!late.is_valid());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_offer_poll() {
        let queue = Arc::new(IdleQueue::new(5));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for _ in 0..10 {
                        queue.offer(Some(plain_entry())).unwrap();
                        thread::sleep(Duration::from_millis(1));
                        if let Some(entry) = queue.poll() {
                            assert!(entry.is_valid());
                        }
                        assert!(queue.len() <= 5);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(queue.len() <= queue.capacity());
    }
}
