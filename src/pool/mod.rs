//! Bounded worker pool
//!
//! A fixed set of OS worker threads consuming from one bounded queue.
//! `submit` blocks while the queue is full, which gives the dispatch loop
//! natural backpressure. Shutdown is graceful: workers finish the current
//! item and drain the queue before exiting.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, error, trace};

/// Worker pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Pool is shutting down")]
    ShutDown,
}

/// A unit of work: an owned closure executed once on a worker thread
type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolState {
    queue: VecDeque<Job>,
    /// Number of jobs currently executing on workers
    active: usize,
    shutdown: bool,
}

struct PoolInner {
    state: Mutex<PoolState>,
    /// Signaled when a job is pushed or shutdown begins
    not_empty: Condvar,
    /// Signaled when a job completes or is dequeued
    not_full: Condvar,
    capacity: usize,
}

/// Fixed-size pool of worker threads over a bounded queue
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Creates a pool with `workers` threads and a queue bound of `capacity`
    ///
    /// # Returns
    ///
    /// * `Ok(WorkerPool)` - All worker threads started
    /// * `Err(PoolError::Spawn)` - A thread could not be created; threads
    ///   already started are shut down before returning
    pub fn new(workers: usize, capacity: usize) -> Result<Self, PoolError> {
        assert!(workers > 0, "pool requires at least one worker");
        assert!(capacity > 0, "pool requires a non-zero queue capacity");

        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                active: 0,
                shutdown: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        });

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker_inner = Arc::clone(&inner);
            let spawned = std::thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || worker_loop(id, worker_inner));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    let mut pool = WorkerPool {
                        inner,
                        workers: handles,
                    };
                    pool.shutdown();
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        debug!(workers, capacity, "worker pool started");
        Ok(WorkerPool {
            inner,
            workers: handles,
        })
    }

    /// Submits a job, blocking while the queue is at capacity
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The job was queued
    /// * `Err(PoolError::ShutDown)` - The pool is shutting down
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock().unwrap();
        while state.queue.len() >= self.inner.capacity && !state.shutdown {
            state = self.inner.not_full.wait(state).unwrap();
        }
        if state.shutdown {
            return Err(PoolError::ShutDown);
        }
        state.queue.push_back(Box::new(job));
        drop(state);
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Blocks until the queue is empty and no worker is mid-execution
    pub fn wait(&self) {
        let mut state = self.inner.state.lock().unwrap();
        while !state.queue.is_empty() || state.active > 0 {
            state = self.inner.not_full.wait(state).unwrap();
        }
    }

    /// Number of jobs waiting in the queue
    pub fn queue_depth(&self) -> usize {
        self.inner.state.lock().unwrap().queue.len()
    }

    /// True when nothing is queued and nothing is executing
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        state.queue.is_empty() && state.active == 0
    }

    /// Shuts the pool down and joins all workers
    ///
    /// Workers drain the remaining queue before exiting. Safe to call more
    /// than once.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.shutdown && self.workers.is_empty() {
                return;
            }
            state.shutdown = true;
        }
        self.inner.not_empty.notify_all();
        self.inner.not_full.notify_all();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked outside a job");
            }
        }
        debug!("worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, inner: Arc<PoolInner>) {
    trace!(worker = id, "worker started");
    loop {
        let job = {
            let mut state = inner.state.lock().unwrap();
            loop {
                if let Some(job) = state.queue.pop_front() {
                    state.active += 1;
                    break job;
                }
                if state.shutdown {
                    trace!(worker = id, "worker exiting");
                    return;
                }
                state = inner.not_empty.wait(state).unwrap();
            }
        };
        // A dequeue frees a queue slot for blocked submitters
        inner.not_full.notify_all();

        let result = catch_unwind(AssertUnwindSafe(job));
        if result.is_err() {
            error!(worker = id, "job panicked; worker continues");
        }

        let mut state = inner.state.lock().unwrap();
        state.active -= 1;
        drop(state);
        inner.not_full.notify_all();
    }
}
