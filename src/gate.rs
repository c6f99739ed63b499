//! Counting admission gate bounding the number of borrowed entries

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::errors::{PoolError, PoolResult};

struct GateState {
    permits: usize,
    closed: bool,
}

/// Counting semaphore with timed acquisition and close support
pub(crate) struct AdmissionGate {
    state: Mutex<GateState>,
    released: Condvar,
    max_permits: usize,
}

impl AdmissionGate {
    pub fn new(max_permits: usize) -> Self {
        Self {
            state: Mutex::new(GateState {
                permits: max_permits,
                closed: false,
            }),
            released: Condvar::new(),
            max_permits,
        }
    }

    /// Take one permit, waiting at most `timeout`
    pub fn acquire(&self, timeout: Duration) -> PoolResult<()> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        if state.closed {
            return Err(PoolError::Closed);
        }

        loop {
            if state.permits > 0 {
                state.permits -= 1;
                return Ok(());
            }

            let timed_out = match deadline {
                Some(deadline) => self.released.wait_until(&mut state, deadline).timed_out(),
                None => {
                    self.released.wait(&mut state);
                    false
                }
            };

            if state.closed {
                return Err(PoolError::Interrupted);
            }
            if timed_out {
                // a release may have landed right at the deadline
                if state.permits > 0 {
                    state.permits -= 1;
                    return Ok(());
                }
                return Err(PoolError::Timeout(timeout));
            }
        }
    }

    /// Take one permit if one is free right now
    pub fn try_acquire(&self) -> PoolResult<bool> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PoolError::Closed);
        }
        if state.permits == 0 {
            return Ok(false);
        }
        state.permits -= 1;
        Ok(true)
    }

    /// Give one permit back and wake a single waiter
    pub fn release(&self) {
        let mut state = self.state.lock();
        if state.permits >= self.max_permits {
            warn!(
                max_permits = self.max_permits,
                "admission gate released more often than acquired"
            );
            return;
        }
        state.permits += 1;
        drop(state);
        self.released.notify_one();
    }

    /// Reject future acquisitions and wake every waiter
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        let was_open = !state.closed;
        state.closed = true;
        drop(state);
        self.released.notify_all();
        was_open
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn available_permits(&self) -> usize {
        self.state.lock().permits
    }

    pub fn max_permits(&self) -> usize {
        self.max_permits
    }
}

/// Releases one permit when dropped
pub(crate) struct PermitGuard<'a>(pub &'a AdmissionGate);

impl PermitGuard<'_> {
    /// Hand the permit over to the borrowed entry instead of releasing it
    pub fn keep(self) {
        std::mem::forget(self);
    }
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_and_release() {
        let gate = AdmissionGate::new(2);
        gate.acquire(Duration::from_millis(10)).unwrap();
        assert!(gate.try_acquire().unwrap());
        assert!(!gate.try_acquire().unwrap());
        assert_eq!(gate.available_permits(), 0);

        gate.release();
        assert_eq!(gate.available_permits(), 1);
    }

    #[test]
    fn test_acquire_times_out() {
        let gate = AdmissionGate::new(1);
        gate.acquire(Duration::from_millis(10)).unwrap();

        let started = Instant::now();
        let err = gate.acquire(Duration::from_millis(50)).unwrap_err();

        assert!(matches!(err, PoolError::Timeout(_)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_waiter_woken_by_release() {
        let gate = Arc::new(AdmissionGate::new(1));
        gate.acquire(Duration::ZERO).unwrap();

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.acquire(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        gate.release();

        assert!(waiter.join().unwrap().is_ok());
        assert_eq!(gate.available_permits(), 0);
    }

    #[test]
    fn test_close_interrupts_waiters() {
        let gate = Arc::new(AdmissionGate::new(1));
        gate.acquire(Duration::ZERO).unwrap();

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.acquire(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(gate.close());
        assert!(!gate.close());

        assert!(matches!(waiter.join().unwrap(), Err(PoolError::Interrupted)));
        assert!(matches!(gate.try_acquire(), Err(PoolError::Closed)));
    }

    #[test]
    fn test_excess_release_ignored() {
        let gate = AdmissionGate::new(2);
        gate.release();
        assert_eq!(gate.available_permits(), 2);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let gate = AdmissionGate::new(1);
        assert!(gate.try_acquire().unwrap());
        {
            let _guard = PermitGuard(&gate);
        }
        assert_eq!(gate.available_permits(), 1);

        assert!(gate.try_acquire().unwrap());
        PermitGuard(&gate).keep();
        assert_eq!(gate.available_permits(), 0);
    }
}
