use std::fmt;
use std::future::IntoFuture;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::completion::Completion;
use crate::error::{panic_message, PromiseError};
use crate::runtime::Runtime;
use crate::waiter::{self, Waiter};

/// Observable state of a promise, without its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseState {
    Pending,
    Resolved,
    Rejected,
}

impl PromiseState {
    fn of<T>(outcome: &anyhow::Result<T>) -> Self {
        match outcome {
            Ok(_) => Self::Resolved,
            Err(_) => Self::Rejected,
        }
    }

    pub fn is_settled(self) -> bool {
        self != Self::Pending
    }
}

impl fmt::Display for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Resolved => f.write_str("resolved"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

/// Called with the outcome once; responsible for its own scheduling.
type Reaction<T> = Box<dyn FnOnce(anyhow::Result<T>) + Send>;

enum State<T> {
    Pending(Option<Reaction<T>>),
    Settled(anyhow::Result<T>),
    /// The outcome has been handed to the reaction.
    Observed(PromiseState),
}

/// Shared settle-once cell between a promise and its completion gate.
pub(crate) struct Slot<T> {
    state: Mutex<State<T>>,
}

impl<T> Slot<T> {
    fn pending() -> Self {
        Self {
            state: Mutex::new(State::Pending(None)),
        }
    }

    fn settled(outcome: anyhow::Result<T>) -> Self {
        Self {
            state: Mutex::new(State::Settled(outcome)),
        }
    }

    /// The check and the transition happen under one lock, so of two racing
    /// settlers exactly one gets `Ok`.
    pub(crate) fn settle(&self, outcome: anyhow::Result<T>) -> Result<(), PromiseError> {
        let mut state = self.state.lock();
        if !matches!(*state, State::Pending(_)) {
            return Err(PromiseError::AlreadySettled);
        }
        let observed = PromiseState::of(&outcome);
        match std::mem::replace(&mut *state, State::Observed(observed)) {
            State::Pending(Some(reaction)) => {
                drop(state);
                reaction(outcome);
            }
            _ => *state = State::Settled(outcome),
        }
        Ok(())
    }

    fn subscribe(&self, reaction: Reaction<T>) {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, State::Pending(None)) {
            State::Pending(None) => *state = State::Pending(Some(reaction)),
            State::Settled(outcome) => {
                *state = State::Observed(PromiseState::of(&outcome));
                drop(state);
                reaction(outcome);
            }
            other => {
                // Unreachable through the public API: observing consumes the promise.
                *state = other;
                drop(state);
                error!("promise observed twice; dropping the second reaction");
            }
        }
    }

    fn state(&self) -> PromiseState {
        match &*self.state.lock() {
            State::Pending(_) => PromiseState::Pending,
            State::Settled(outcome) => PromiseState::of(outcome),
            State::Observed(state) => *state,
        }
    }
}

type Executor<T> = Box<dyn FnOnce(Completion<T>) + Send>;

/// A value of type `T` that becomes available later, or a rejection reason.
///
/// A promise settles once. Observing it (any `then`-family method, awaiting
/// it, or [`wait`](Self::wait)) consumes it, so each observation produces a
/// new downstream promise. Continuations always run on the promise's
/// [`Runtime`], never inline in the caller's frame, even when the value is
/// already known.
///
/// An executor passed to [`Promise::new`] does not run until the promise is
/// first observed.
///
/// # Examples
///
/// ```
/// use promise_kit::{PoolConfig, Promise, Runtime, WorkerPool};
///
/// let rt = Runtime::new(WorkerPool::new(PoolConfig::bounded(2)));
/// let answer = Promise::new(&rt, |done| done.resolve(20))
///     .then(|v| Ok(v + 1))
///     .and_then({
///         let rt = rt.clone();
///         move |v| Promise::resolve(&rt, v * 2)
///     })
///     .wait()
///     .unwrap();
/// assert_eq!(answer, 42);
/// ```
#[must_use = "a promise does nothing unless observed"]
pub struct Promise<T> {
    slot: Arc<Slot<T>>,
    executor: Option<Executor<T>>,
    runtime: Runtime,
}

/// What a continuation handler produced.
pub(crate) enum Step<U> {
    Settle(anyhow::Result<U>),
    Follow(Promise<U>),
}

impl<T: Send + 'static> Promise<T> {
    /// A promise settled by `executor`, which receives the completion gate
    /// and must call resolve or reject on it, now or from a later callback.
    pub fn new<F>(runtime: &Runtime, executor: F) -> Self
    where
        F: FnOnce(Completion<T>) + Send + 'static,
    {
        Self {
            slot: Arc::new(Slot::pending()),
            executor: Some(Box::new(executor)),
            runtime: runtime.clone(),
        }
    }

    /// An unsettled promise and the gate that settles it.
    pub fn pending(runtime: &Runtime) -> (Completion<T>, Self) {
        let slot = Arc::new(Slot::pending());
        let promise = Self {
            slot: slot.clone(),
            executor: None,
            runtime: runtime.clone(),
        };
        (Completion::new(slot), promise)
    }

    pub fn resolve(runtime: &Runtime, value: T) -> Self {
        Self::from_result(runtime, Ok(value))
    }

    pub fn reject(runtime: &Runtime, reason: impl Into<anyhow::Error>) -> Self {
        Self::from_result(runtime, Err(reason.into()))
    }

    pub fn from_result(runtime: &Runtime, outcome: anyhow::Result<T>) -> Self {
        Self {
            slot: Arc::new(Slot::settled(outcome)),
            executor: None,
            runtime: runtime.clone(),
        }
    }

    pub fn state(&self) -> PromiseState {
        self.slot.state()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Run `on_resolved` with the value. A rejection skips it and passes
    /// through unchanged; an `Err` from the handler rejects the result.
    pub fn then<U, F>(self, on_resolved: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> anyhow::Result<U> + Send + 'static,
    {
        self.chain(|outcome| Step::Settle(outcome.and_then(on_resolved)))
    }

    /// Exactly one of the two handlers runs.
    pub fn then_or_else<U, F, R>(self, on_resolved: F, on_rejected: R) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> anyhow::Result<U> + Send + 'static,
        R: FnOnce(anyhow::Error) -> anyhow::Result<U> + Send + 'static,
    {
        self.chain(|outcome| {
            Step::Settle(match outcome {
                Ok(value) => on_resolved(value),
                Err(reason) => on_rejected(reason),
            })
        })
    }

    /// Recover from a rejection. A resolved value passes through.
    pub fn catch<R>(self, on_rejected: R) -> Promise<T>
    where
        R: FnOnce(anyhow::Error) -> anyhow::Result<T> + Send + 'static,
    {
        self.chain(|outcome| Step::Settle(outcome.or_else(on_rejected)))
    }

    /// Side-effecting continuation.
    pub fn then_accept<F>(self, f: F) -> Promise<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.then(|value| {
            f(value);
            Ok(())
        })
    }

    /// Like [`then`](Self::then), but the handler returns another promise and
    /// the result follows it, so chains never see a nested promise.
    pub fn and_then<U, F>(self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.chain(|outcome| match outcome {
            Ok(value) => Step::Follow(f(value)),
            Err(reason) => Step::Settle(Err(reason)),
        })
    }

    /// Flattening form of [`catch`](Self::catch).
    pub fn or_else<R>(self, f: R) -> Promise<T>
    where
        R: FnOnce(anyhow::Error) -> Promise<T> + Send + 'static,
    {
        self.chain(|outcome| match outcome {
            Ok(value) => Step::Settle(Ok(value)),
            Err(reason) => Step::Follow(f(reason)),
        })
    }

    /// Continue on `runtime`: continuations attached to the returned promise
    /// are scheduled there instead of on this promise's runtime.
    ///
    /// Lazy like [`Promise::new`]: this promise is not observed, and its
    /// executor does not start, until the returned one is.
    pub fn on(self, runtime: &Runtime) -> Promise<T> {
        Promise::new(runtime, move |completion| completion.follow(self))
    }

    /// Block the current thread until the promise settles.
    ///
    /// Never call this on a looper thread for a promise whose continuations
    /// run on that same looper.
    pub fn wait(self) -> anyhow::Result<T> {
        futures::executor::block_on(self.into_future())
    }

    /// The continuation wrapper behind every `then`-family method: a
    /// placeholder promise exists before `handler` runs and is settled by,
    /// or made to follow, whatever the handler produces.
    pub(crate) fn chain<U, F>(self, handler: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(anyhow::Result<T>) -> Step<U> + Send + 'static,
    {
        let (completion, next) = Promise::pending(&self.runtime);
        self.subscribe(move |outcome| {
            match catch_unwind(AssertUnwindSafe(move || handler(outcome))) {
                Ok(Step::Settle(result)) => completion.settle(result),
                Ok(Step::Follow(promise)) => completion.follow(promise),
                Err(payload) => completion.reject(PromiseError::HandlerPanicked {
                    message: panic_message(&*payload),
                }),
            }
        });
        next
    }

    /// Register the single reaction and start the executor if there is one.
    /// The reaction is run on this promise's runtime.
    pub(crate) fn subscribe<F>(mut self, reaction: F)
    where
        F: FnOnce(anyhow::Result<T>) + Send + 'static,
    {
        let runtime = self.runtime.clone();
        self.slot
            .subscribe(Box::new(move |outcome| runtime.spawn(move || reaction(outcome))));

        if let Some(executor) = self.executor.take() {
            let completion = Completion::new(self.slot.clone());
            self.runtime.spawn(move || executor(completion));
        }
    }
}

impl<T: Send + 'static> IntoFuture for Promise<T> {
    type Output = anyhow::Result<T>;
    type IntoFuture = Waiter<T>;

    fn into_future(self) -> Waiter<T> {
        let (notifier, waiter) = waiter::channel();
        self.subscribe(move |outcome| notifier.send(outcome));
        waiter
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.slot.state())
            .field("started", &self.executor.is_none())
            .finish()
    }
}
