//! Background top-up of the idle queue

use std::sync::Arc;
use std::time::Duration;

use tracing::{trace, warn};

use crate::config::PoolConfig;
use crate::errors::PoolResult;
use crate::factory::EntryFactory;
use crate::queue::IdleQueue;
use crate::scheduler::{Schedule, ScheduledTask, WorkerPool};

/// Keeps the idle queue topped up to `min_idle_entries`
///
/// Convergence is eventual: the shortfall is read from the live queue length,
/// so concurrent borrows and returns can make the idle count briefly over- or
/// undershoot the target between runs.
pub struct EnsureLoop<T> {
    config: PoolConfig,
    queue: Arc<IdleQueue<T>>,
    factory: Arc<EntryFactory<T>>,
    task: ScheduledTask,
}

impl<T: Send + Sync + 'static> EnsureLoop<T> {
    pub fn new(
        config: PoolConfig,
        queue: Arc<IdleQueue<T>>,
        factory: Arc<EntryFactory<T>>,
    ) -> Self {
        Self {
            config,
            queue,
            factory,
            task: ScheduledTask::new("pool-ensure"),
        }
    }

    /// Start the loop
    ///
    /// # Errors
    ///
    /// [`PoolError::AlreadyScheduled`](crate::PoolError::AlreadyScheduled) on
    /// the second call, [`PoolError::ThreadSpawn`](crate::PoolError::ThreadSpawn)
    /// if the threads cannot be started.
    pub fn schedule(&self) -> PoolResult<()> {
        let schedule = Schedule {
            initial_delay: Duration::ZERO,
            interval: self.config.ensure_interval,
            threads: self.config.ensure_threads,
        };
        let target = self.config.min_idle_entries;
        let queue = Arc::clone(&self.queue);
        let factory = Arc::clone(&self.factory);

        self.task
            .schedule(schedule, move |workers| ensure_idle(target, &queue, &factory, workers))
    }
}

impl<T> EnsureLoop<T> {
    pub fn is_scheduled(&self) -> bool {
        self.task.is_scheduled()
    }

    /// Stop scheduling further runs
    pub fn shutdown(&self) {
        self.task.shutdown();
    }
}

fn ensure_idle<T: Send + Sync + 'static>(
    target: usize,
    queue: &Arc<IdleQueue<T>>,
    factory: &Arc<EntryFactory<T>>,
    workers: &WorkerPool,
) {
    let needed = queue.shortfall(target);
    if needed > 0 {
        trace!(needed, "topping up idle entries");
    }

    for _ in 0..needed {
        let task_queue = Arc::clone(queue);
        let factory = Arc::clone(factory);
        let submitted = workers.submit(move || match factory.create() {
            Ok(entry) => {
                // cannot fail, the entry is present
                let _ = task_queue.offer(Some(entry));
            }
            Err(e) => warn!(error = %e, "failed to create pool entry in background"),
        });

        if !submitted || queue.shortfall(target) == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::NoopValidator;
    use crate::errors::{BoxError, PoolError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn counting_factory(calls: &Arc<AtomicUsize>, fail: bool) -> Arc<EntryFactory<usize>> {
        let calls = Arc::clone(calls);
        Arc::new(EntryFactory::new(
            Arc::new(move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err::<usize, BoxError>("backend down".into())
                } else {
                    Ok(n)
                }
            }),
            Arc::new(NoopValidator),
        ))
    }

    fn config(min_idle: usize) -> PoolConfig {
        PoolConfig::new()
            .with_max_idle_entries(4)
            .with_min_idle_entries(min_idle)
            .with_ensure(2, Duration::from_millis(10))
    }

    #[test]
    fn test_schedule_twice_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ensure = EnsureLoop::new(
            config(0),
            Arc::new(IdleQueue::new(4)),
            counting_factory(&calls, false),
        );

        ensure.schedule().unwrap();
        assert!(matches!(ensure.schedule(), Err(PoolError::AlreadyScheduled)));
    }

    #[test]
    fn test_fills_queue_to_target() {
        let calls = Arc::new(AtomicUsize::new(0));
        let queue = Arc::new(IdleQueue::new(4));
        let ensure =
            EnsureLoop::new(config(3), Arc::clone(&queue), counting_factory(&calls, false));

        ensure.schedule().unwrap();
        thread::sleep(Duration::from_millis(200));

        assert!(queue.len() >= 3);
        assert!(queue.len() <= 4);
    }

    #[test]
    fn test_refills_after_consumption() {
        let calls = Arc::new(AtomicUsize::new(0));
        let queue = Arc::new(IdleQueue::new(4));
        let ensure =
            EnsureLoop::new(config(2), Arc::clone(&queue), counting_factory(&calls, false));

        ensure.schedule().unwrap();
        thread::sleep(Duration::from_millis(100));
        while queue.poll().is_some() {}
        thread::sleep(Duration::from_millis(150));

        assert!(queue.len() >= 2);
    }

    #[test]
    fn test_creation_failures_do_not_stop_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let queue = Arc::new(IdleQueue::new(4));
        let ensure = EnsureLoop::new(config(1), Arc::clone(&queue), counting_factory(&calls, true));

        ensure.schedule().unwrap();
        thread::sleep(Duration::from_millis(150));

        assert!(queue.is_empty());
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_shutdown_stops_creation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let queue = Arc::new(IdleQueue::new(4));
        let ensure = EnsureLoop::new(config(1), Arc::clone(&queue), counting_factory(&calls, true));

        ensure.schedule().unwrap();
        thread::sleep(Duration::from_millis(50));
        ensure.shutdown();
        thread::sleep(Duration::from_millis(30));

        let after_shutdown = calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(calls.load(Ordering::SeqCst), after_shutdown);
    }
}
