//! Settle-once promises that run on an explicitly injected scheduler.
//!
//! A [`Promise`] is created with an executor that receives a [`Completion`]
//! gate and settles it exactly once. Continuations (`then`, `and_then`,
//! `catch`, ...) consume the promise and return a new one; they are always
//! dispatched through the promise's [`Runtime`], which wraps any [`Schedule`]
//! implementation: a [`WorkerPool`], a [`Looper`] handler for
//! single-thread affinity, or a test double.
//!
//! Rejection reasons are [`anyhow::Error`]s. Misuse of the machinery itself
//! surfaces as a [`PromiseError`] inside that error.
//!
//! The crate also carries [`DependencyGraph`], which orders model inserts so
//! that foreign-key targets are written first.

mod combinators;
pub mod completion;
pub mod config;
pub mod error;
pub mod graph;
pub mod looper;
pub mod pool;
pub mod promise;
pub mod runtime;
mod waiter;

pub use completion::{Completion, SharedCompletion};
pub use config::{PoolConfig, RuntimeConfig};
pub use error::{ConfigError, GraphError, PromiseError, ScheduleError};
pub use graph::{DependencyGraph, ForeignKey, Model};
pub use looper::{Handler, Looper};
pub use pool::{PoolStats, WorkerPool};
pub use promise::{Promise, PromiseState};
pub use runtime::{Runtime, Schedule, Task};
pub use waiter::Waiter;
