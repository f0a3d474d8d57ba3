use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::error::PromiseError;
use crate::promise::{Promise, Slot};

/// The resolve/reject gate handed to an executor.
///
/// Every settling method consumes the gate, so a single `Completion` cannot
/// settle twice. Dropping it unsettled is a bug in the executor: the promise
/// rejects with [`PromiseError::Abandoned`] and an error is logged.
#[must_use = "dropping a Completion rejects its promise with `Abandoned`"]
pub struct Completion<T> {
    slot: Option<Arc<Slot<T>>>,
}

impl<T> Completion<T> {
    pub(crate) fn new(slot: Arc<Slot<T>>) -> Self {
        Self { slot: Some(slot) }
    }

    pub fn resolve(self, value: T) {
        self.settle(Ok(value))
    }

    pub fn reject(self, reason: impl Into<anyhow::Error>) {
        self.settle(Err(reason.into()))
    }

    /// Resolve with `Ok`, reject with `Err`.
    pub fn settle(mut self, outcome: anyhow::Result<T>) {
        if let Some(slot) = self.slot.take() {
            if let Err(e) = slot.settle(outcome) {
                error!(error = %e, "completion settled a promise that was already settled");
            }
        }
    }

    /// Turn the gate into a cloneable one, for producers that report through
    /// more than one callback (a success and a failure listener, say).
    pub fn shared(self) -> SharedCompletion<T> {
        SharedCompletion {
            inner: Arc::new(Mutex::new(Some(self))),
        }
    }
}

impl<T: Send + 'static> Completion<T> {
    /// Settle with whatever `promise` eventually settles with.
    pub fn follow(self, promise: Promise<T>) {
        promise.subscribe(move |outcome| self.settle(outcome));
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            error!("completion dropped without resolve or reject");
            let _ = slot.settle(Err(PromiseError::Abandoned.into()));
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.slot.is_none())
            .finish()
    }
}

/// A [`Completion`] that can be cloned and settled through `&self`.
///
/// Only the first settle wins. The `try_*` methods report later attempts as
/// [`PromiseError::AlreadySettled`]; [`resolve`](Self::resolve) and
/// [`reject`](Self::reject) treat them as a fatal misuse and panic. When the
/// last clone is dropped unsettled the promise rejects with `Abandoned`.
pub struct SharedCompletion<T> {
    inner: Arc<Mutex<Option<Completion<T>>>>,
}

impl<T> Clone for SharedCompletion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> SharedCompletion<T> {
    pub fn try_settle(&self, outcome: anyhow::Result<T>) -> Result<(), PromiseError> {
        let completion = self.inner.lock().take();
        match completion {
            Some(completion) => {
                completion.settle(outcome);
                Ok(())
            }
            None => Err(PromiseError::AlreadySettled),
        }
    }

    pub fn try_resolve(&self, value: T) -> Result<(), PromiseError> {
        self.try_settle(Ok(value))
    }

    pub fn try_reject(&self, reason: impl Into<anyhow::Error>) -> Result<(), PromiseError> {
        self.try_settle(Err(reason.into()))
    }

    /// # Panics
    ///
    /// If any clone of this gate has already settled.
    pub fn resolve(&self, value: T) {
        if let Err(e) = self.try_resolve(value) {
            panic!("{e}");
        }
    }

    /// # Panics
    ///
    /// If any clone of this gate has already settled.
    pub fn reject(&self, reason: impl Into<anyhow::Error>) {
        if let Err(e) = self.try_reject(reason) {
            panic!("{e}");
        }
    }

    pub fn is_settled(&self) -> bool {
        self.inner.lock().is_none()
    }
}

impl<T> fmt::Debug for SharedCompletion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCompletion")
            .field("settled", &self.is_settled())
            .finish()
    }
}
