//! One-shot slot between a settling promise and a task awaiting it.
//!
//! The [`Notifier`] side is moved into the promise's reaction; the [`Waiter`]
//! side is the future handed out by `Promise::into_future`. If the notifier is
//! dropped without sending (its task was refused by the scheduler, say) the
//! waiter wakes with [`PromiseError::Abandoned`] rather than hanging.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::error::PromiseError;

#[derive(Debug)]
enum WakerState {
    Fresh,
    Tainted,
}

struct Inner<T> {
    value: Option<anyhow::Result<T>>,
    waker: Result<Waker, WakerState>,
}

pub(crate) struct Notifier<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

/// Future returned by awaiting a [`Promise`](crate::Promise).
#[must_use = "futures do nothing unless polled"]
pub struct Waiter<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

pub(crate) fn channel<T>() -> (Notifier<T>, Waiter<T>) {
    let inner = Arc::new(Mutex::new(Inner {
        value: None,
        waker: Err(WakerState::Fresh),
    }));
    (
        Notifier {
            inner: inner.clone(),
        },
        Waiter { inner },
    )
}

impl<T> Notifier<T> {
    pub(crate) fn send(self, outcome: anyhow::Result<T>) {
        let mut inner = self.inner.lock();
        inner.value = Some(outcome);
        if let Ok(waker) = std::mem::replace(&mut inner.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

impl<T> Drop for Notifier<T> {
    /// Wakes the waiter; with no value stored it will report `Abandoned`.
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if let Ok(waker) = std::mem::replace(&mut inner.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

impl<T> Future for Waiter<T> {
    type Output = anyhow::Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.lock();
        match inner.value.take() {
            Some(value) => Poll::Ready(value),
            None => match std::mem::replace(&mut inner.waker, Ok(cx.waker().clone())) {
                Err(WakerState::Tainted) => {
                    inner.waker = Err(WakerState::Tainted);
                    Poll::Ready(Err(PromiseError::Abandoned.into()))
                }
                _ => Poll::Pending,
            },
        }
    }
}
