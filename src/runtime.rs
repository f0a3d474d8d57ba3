use std::fmt;
use std::sync::Arc;

use tracing::error;

use crate::config::RuntimeConfig;
use crate::error::{ConfigError, ScheduleError};
use crate::pool::WorkerPool;

/// A unit of work handed to a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run tasks somewhere else: a worker pool, a looper
/// thread, or a test double.
pub trait Schedule: Send + Sync + 'static {
    fn schedule(&self, task: Task) -> Result<(), ScheduleError>;
}

/// The scheduling context every promise carries.
///
/// Constructed explicitly and passed around; there is no process-wide default.
/// Cloning is cheap and all clones share the same scheduler.
#[derive(Clone)]
pub struct Runtime {
    scheduler: Arc<dyn Schedule>,
}

impl Runtime {
    pub fn new(scheduler: impl Schedule) -> Self {
        Self {
            scheduler: Arc::new(scheduler),
        }
    }

    pub fn from_arc(scheduler: Arc<dyn Schedule>) -> Self {
        Self { scheduler }
    }

    /// Build a worker pool from `config` and wrap it. The pool handle is
    /// returned too so the caller can shut it down.
    pub fn from_config(config: &RuntimeConfig) -> Result<(Self, Arc<WorkerPool>), ConfigError> {
        config.validate()?;
        let pool = Arc::new(WorkerPool::new(config.pool.clone()));
        Ok((Self::from_arc(pool.clone()), pool))
    }

    /// Hand `task` to the scheduler.
    ///
    /// A refused task is dropped. Anything it owns is dropped with it, which
    /// for a [`Completion`](crate::Completion) means the dependent promise
    /// rejects with [`Abandoned`](crate::PromiseError::Abandoned).
    pub(crate) fn spawn(&self, task: impl FnOnce() + Send + 'static) {
        if let Err(e) = self.scheduler.schedule(Box::new(task)) {
            error!(error = %e, "dropping task the scheduler refused");
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}
