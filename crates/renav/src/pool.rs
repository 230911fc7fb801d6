//! The bounded worker pool groups are processed on.
//!
//! One coordinator hands out tasks. Before handing out a task it waits for a free worker
//! slot, polling at a fixed interval. If no slot frees up in time, that task fails with
//! [`PoolError::AdmissionTimeout`] and the coordinator moves on to the next one.

use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use thiserror::Error;

/// The most workers a pool may have.
pub const MAX_WORKERS: usize = 8;

/// Settings of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    /// Number of worker threads, between 1 and [`MAX_WORKERS`].
    pub workers: usize,
    /// How long a task may wait for a free worker.
    pub admission_timeout: Duration,
    /// How long to sleep between checks for a free worker.
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            admission_timeout: Duration::from_secs(200),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl PoolConfig {
    /// Number of times a free slot is polled for before giving up.
    pub fn admission_attempts(&self) -> u128 {
        (self.admission_timeout.as_nanos() / self.poll_interval.as_nanos().max(1)).max(1)
    }
}

/// Errors of the worker pool.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The worker count is zero or above [`MAX_WORKERS`].
    #[error("worker count must be between 1 and {MAX_WORKERS}, got {workers}")]
    InvalidWorkerCount {
        /// The requested count
        workers: usize,
    },
    /// The threads could not be spawned.
    #[error("failed to build worker threads: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
    /// No worker became free in time.
    #[error("no worker became available within {waited:?}")]
    AdmissionTimeout {
        /// How long the task waited
        waited: Duration,
    },
    /// The pool was cancelled before the task started.
    #[error("cancelled before the task started")]
    Cancelled,
}

/// The outcome of one task handed to [`WorkerPool::run`].
#[derive(Debug)]
pub struct TaskOutcome<T> {
    /// Position of the task in the list passed to [`WorkerPool::run`].
    pub index: usize,
    /// What the task returned, or why it never ran.
    pub result: Result<T, PoolError>,
}

/// A fixed number of worker threads with admission control and cooperative cancellation.
#[derive(Debug)]
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    config: PoolConfig,
    busy: AtomicUsize,
    cancel: AtomicBool,
}

impl WorkerPool {
    /// Spawns the worker threads.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        if config.workers == 0 || config.workers > MAX_WORKERS {
            return Err(PoolError::InvalidWorkerCount {
                workers: config.workers,
            });
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("renav-worker-{i}"))
            .build()?;
        Ok(Self {
            pool,
            config,
            busy: AtomicUsize::new(0),
            cancel: AtomicBool::new(false),
        })
    }

    /// The settings the pool was built with.
    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Asks running tasks to stop and keeps pending tasks from starting.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Whether [`WorkerPool::cancel`] was called.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Runs every task on a worker and hands each outcome to `sink` as it completes.
    ///
    /// Each task receives the cancellation flag, which it is expected to check between
    /// units of work. `sink` is called on whichever thread finished the task, or on the
    /// calling thread for tasks that never started. The calling thread acts as the
    /// coordinator and returns once every admitted task has finished.
    pub fn run<T, F, S>(&self, tasks: Vec<F>, sink: &S)
    where
        T: Send,
        F: FnOnce(&AtomicBool) -> T + Send,
        S: Fn(TaskOutcome<T>) + Sync,
    {
        self.pool.in_place_scope(|scope| {
            for (index, task) in tasks.into_iter().enumerate() {
                let slot = match self.acquire_slot() {
                    Ok(slot) => slot,
                    Err(error) => {
                        tracing::warn!("Task {index} was not started: {error}");
                        sink(TaskOutcome {
                            index,
                            result: Err(error),
                        });
                        continue;
                    }
                };
                let cancel = &self.cancel;
                scope.spawn(move |_| {
                    let value = task(cancel);
                    drop(slot);
                    sink(TaskOutcome {
                        index,
                        result: Ok(value),
                    });
                });
            }
        });
    }

    fn acquire_slot(&self) -> Result<Slot<'_>, PoolError> {
        for _ in 0..self.config.admission_attempts() {
            if self.is_cancelled() {
                return Err(PoolError::Cancelled);
            }
            let acquired = self
                .busy
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |busy| {
                    (busy < self.config.workers).then_some(busy + 1)
                })
                .is_ok();
            if acquired {
                return Ok(Slot(&self.busy));
            }
            std::thread::sleep(self.config.poll_interval);
        }
        Err(PoolError::AdmissionTimeout {
            waited: self.config.admission_timeout,
        })
    }
}

/// A claimed worker slot, released on drop.
struct Slot<'a>(&'a AtomicUsize);

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
