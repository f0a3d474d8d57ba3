//! Worker pool that runs promise executors and continuations.
//!
//! The pool is either cached (no thread limit, a worker is started whenever
//! none is idle) or bounded (at most `max_threads` workers plus a FIFO queue).
//! Which one is chosen by [`PoolConfig`]; there is no implicit default limit.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, warn};

use crate::config::PoolConfig;
use crate::error::{panic_message, ScheduleError};
use crate::runtime::{Schedule, Task};

/// Pool metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Live worker threads.
    pub workers: usize,
    /// Workers parked waiting for work.
    pub idle: usize,
    /// Tasks currently executing on a worker.
    pub active: usize,
    /// Tasks waiting in the queue.
    pub queue_depth: usize,
    /// Tasks finished (including panicked ones) since creation.
    pub tasks_completed: u64,
}

struct State {
    tasks: VecDeque<Task>,
    workers: usize,
    idle: usize,
    active: usize,
    shutdown: bool,
}

struct Inner {
    config: PoolConfig,
    state: Mutex<State>,
    work_ready: Condvar,
    drain_cond: Condvar,
    next_id: AtomicUsize,
    tasks_completed: AtomicU64,
}

pub struct WorkerPool {
    inner: Arc<Inner>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a pool. Core workers are started eagerly; everything else is
    /// started on demand.
    pub fn new(config: PoolConfig) -> Self {
        let core = config.core_threads;
        let pool = Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    tasks: VecDeque::new(),
                    workers: 0,
                    idle: 0,
                    active: 0,
                    shutdown: false,
                }),
                work_ready: Condvar::new(),
                drain_cond: Condvar::new(),
                next_id: AtomicUsize::new(0),
                tasks_completed: AtomicU64::new(0),
            }),
            handles: Mutex::new(Vec::new()),
        };
        for _ in 0..core {
            pool.inner.state.lock().workers += 1;
            if let Err(e) = pool.start_worker() {
                pool.inner.state.lock().workers -= 1;
                error!(error = %e, "failed to start core worker");
            }
        }
        pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Submit a task.
    ///
    /// Fails after [`shutdown`](Self::shutdown), when a bounded pool's queue
    /// is full, or when no worker exists and a new one cannot be spawned. A
    /// refused task is dropped, never run on the calling thread.
    pub fn submit(&self, task: Task) -> Result<(), ScheduleError> {
        let config = &self.inner.config;
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return refuse(state, task, ScheduleError::ShutDown);
        }

        let at_thread_limit = config.max_threads.is_some_and(|max| state.workers >= max);
        let queue_full = config
            .max_queue_depth
            .is_some_and(|depth| state.tasks.len() >= depth);
        if at_thread_limit && queue_full && state.idle == 0 {
            warn!(pool = %config.name, "queue full, refusing task");
            return refuse(state, task, ScheduleError::QueueFull);
        }

        state.tasks.push_back(task);
        if state.idle >= state.tasks.len() || at_thread_limit {
            drop(state);
            self.inner.work_ready.notify_one();
            return Ok(());
        }

        state.workers += 1;
        drop(state);
        if let Err(e) = self.start_worker() {
            let mut state = self.inner.state.lock();
            state.workers -= 1;
            if state.workers == 0 {
                // Nobody will ever pop it.
                if let Some(orphan) = state.tasks.pop_back() {
                    return refuse(state, orphan, ScheduleError::Spawn(e));
                }
                return Err(ScheduleError::Spawn(e));
            }
            error!(pool = %config.name, error = %e, "failed to grow pool, queueing task");
            drop(state);
            self.inner.work_ready.notify_one();
        }
        Ok(())
    }

    /// Block until the queue is empty and no task is executing.
    pub fn drain(&self) {
        let mut state = self.inner.state.lock();
        while !state.tasks.is_empty() || state.active > 0 {
            self.inner.drain_cond.wait(&mut state);
        }
    }

    /// Stop accepting work, let workers finish the queue, and join them.
    ///
    /// Safe to call more than once, and from a worker thread (that worker is
    /// not joined).
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
            self.inner.work_ready.notify_all();
        }
        let current = thread::current().id();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            workers: state.workers,
            idle: state.idle,
            active: state.active,
            queue_depth: state.tasks.len(),
            tasks_completed: self.inner.tasks_completed.load(Ordering::Relaxed),
        }
    }

    /// The caller must already have counted the worker in `state.workers`.
    fn start_worker(&self) -> std::io::Result<()> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.inner.config.name, id);
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(&inner))?;
        debug!(worker = %name, "started worker");

        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Ok(())
    }
}

impl Schedule for WorkerPool {
    fn schedule(&self, task: Task) -> Result<(), ScheduleError> {
        self.submit(task)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decrements `active` and wakes drain waiters even if the task panicked.
struct ActiveGuard<'a> {
    inner: &'a Inner,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.active -= 1;
        self.inner.tasks_completed.fetch_add(1, Ordering::Relaxed);
        if state.active == 0 && state.tasks.is_empty() {
            self.inner.drain_cond.notify_all();
        }
    }
}

/// Release the lock before dropping `task`: its captures may settle a
/// promise, which schedules onto this same pool.
fn refuse(
    state: MutexGuard<'_, State>,
    task: Task,
    err: ScheduleError,
) -> Result<(), ScheduleError> {
    drop(state);
    drop(task);
    Err(err)
}

fn run_task(task: Task) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
        error!(panic = %panic_message(&*payload), "promise task panicked");
    }
}

fn worker_loop(inner: &Inner) {
    let keep_alive = inner.config.keep_alive();
    loop {
        let task = {
            let mut state = inner.state.lock();
            loop {
                if let Some(task) = state.tasks.pop_front() {
                    state.active += 1;
                    break task;
                }
                if state.shutdown {
                    state.workers -= 1;
                    return;
                }
                state.idle += 1;
                let timed_out = inner.work_ready.wait_for(&mut state, keep_alive).timed_out();
                state.idle -= 1;
                if timed_out
                    && state.tasks.is_empty()
                    && !state.shutdown
                    && state.workers > inner.config.core_threads
                {
                    state.workers -= 1;
                    debug!(pool = %inner.config.name, "idle worker exiting");
                    return;
                }
            }
        };

        let _guard = ActiveGuard { inner };
        run_task(task);
    }
}
