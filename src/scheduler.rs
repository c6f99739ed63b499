//! Start-once, fixed-delay background tasks backed by a worker pool

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::errors::{PoolError, PoolResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Timing and sizing of a scheduled task
#[derive(Debug, Clone, Copy)]
pub(crate) struct Schedule {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub threads: usize,
}

/// Fixed set of threads executing submitted jobs
///
/// Once stopped, queued jobs are dropped without running; a job that needs
/// cleanup when skipped must do it in `Drop`.
pub(crate) struct WorkerPool {
    jobs: Sender<Job>,
    stopped: Arc<AtomicBool>,
}

impl WorkerPool {
    fn spawn(name: &str, threads: usize) -> PoolResult<Self> {
        let (jobs, queue) = channel::unbounded::<Job>();
        let stopped = Arc::new(AtomicBool::new(false));

        for index in 0..threads {
            let queue = queue.clone();
            let stopped = Arc::clone(&stopped);
            thread::Builder::new()
                .name(format!("{name}-worker-{index}"))
                .spawn(move || run_worker(queue, stopped))
                .map_err(PoolError::ThreadSpawn)?;
        }

        Ok(Self { jobs, stopped })
    }

    /// Queue a job; returns `false` (dropping the job) once the pool is stopped
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        self.jobs.send(Box::new(job)).is_ok()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

fn run_worker(queue: Receiver<Job>, stopped: Arc<AtomicBool>) {
    for job in queue.iter() {
        if stopped.load(Ordering::Acquire) {
            continue;
        }
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("background job panicked");
        }
    }
}

struct Running {
    // dropping the sender wakes and stops the timer thread
    _shutdown: Sender<()>,
    workers: Arc<WorkerPool>,
}

/// Background task that may be scheduled exactly once
///
/// After `initial_delay` the bootstrap closure runs on a dedicated timer
/// thread, then again `interval` after each run completes. The closure gets
/// the task's worker pool to fan work out to.
pub(crate) struct ScheduledTask {
    name: &'static str,
    scheduled: AtomicBool,
    stopped: AtomicBool,
    running: Mutex<Option<Running>>,
}

impl ScheduledTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            scheduled: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            running: Mutex::new(None),
        }
    }

    /// Start the timer thread and the workers
    ///
    /// # Errors
    ///
    /// [`PoolError::AlreadyScheduled`] on a second call, [`PoolError::Closed`]
    /// after [`ScheduledTask::shutdown`], [`PoolError::ThreadSpawn`] when a
    /// thread cannot be started.
    pub fn schedule<F>(&self, schedule: Schedule, mut bootstrap: F) -> PoolResult<()>
    where
        F: FnMut(&WorkerPool) + Send + 'static,
    {
        if self
            .scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PoolError::AlreadyScheduled);
        }

        // held until the task is stored, so a concurrent shutdown waits for it
        let mut running = self.running.lock();
        if self.stopped.load(Ordering::Acquire) {
            self.scheduled.store(false, Ordering::Release);
            return Err(PoolError::Closed);
        }
        let started = WorkerPool::spawn(self.name, schedule.threads).and_then(|workers| {
            let workers = Arc::new(workers);
            let (shutdown, shutdown_signal) = channel::bounded::<()>(1);
            let timer_workers = Arc::clone(&workers);
            let name = self.name;

            thread::Builder::new()
                .name(format!("{name}-timer"))
                .spawn(move || {
                    if stop_requested(&shutdown_signal, schedule.initial_delay) {
                        return;
                    }
                    loop {
                        let tick = AssertUnwindSafe(|| bootstrap(&timer_workers));
                        if panic::catch_unwind(tick).is_err() {
                            warn!(task = name, "background task bootstrap panicked");
                        }
                        if stop_requested(&shutdown_signal, schedule.interval) {
                            break;
                        }
                    }
                    debug!(task = name, "background task stopped");
                })
                .map_err(PoolError::ThreadSpawn)?;

            Ok(Running {
                _shutdown: shutdown,
                workers,
            })
        });

        match started {
            Ok(started) => {
                *running = Some(started);
                debug!(
                    task = self.name,
                    threads = schedule.threads,
                    interval = ?schedule.interval,
                    "background task scheduled"
                );
                Ok(())
            }
            Err(e) => {
                self.scheduled.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Acquire)
    }

    /// Stop the timer and the workers; jobs already running are left to finish
    ///
    /// Final: a task shut down before it was scheduled refuses to start.
    pub fn shutdown(&self) {
        let mut running = self.running.lock();
        self.stopped.store(true, Ordering::Release);
        if let Some(running) = running.take() {
            running.workers.stop();
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn stop_requested(signal: &Receiver<()>, delay: Duration) -> bool {
    !matches!(signal.recv_timeout(delay), Err(RecvTimeoutError::Timeout))
}
