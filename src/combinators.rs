//! Aggregating several promises into one.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::completion::Completion;
use crate::error::PromiseError;
use crate::promise::Promise;
use crate::runtime::Runtime;

struct Gather<T> {
    values: Vec<Option<T>>,
    remaining: usize,
    completion: Option<Completion<Vec<T>>>,
}

impl<T: Send + 'static> Promise<T> {
    /// Resolve with every input's value, in input order, once all of them
    /// have resolved.
    ///
    /// The first rejection rejects the aggregate. Inputs still running are
    /// not cancelled; their outcomes are discarded. No inputs resolves to an
    /// empty vector.
    pub fn all<I>(runtime: &Runtime, promises: I) -> Promise<Vec<T>>
    where
        I: IntoIterator<Item = Promise<T>>,
    {
        let promises: Vec<_> = promises.into_iter().collect();
        if promises.is_empty() {
            return Promise::resolve(runtime, Vec::new());
        }

        let (completion, all) = Promise::pending(runtime);
        let gather = Arc::new(Mutex::new(Gather {
            values: promises.iter().map(|_| None).collect(),
            remaining: promises.len(),
            completion: Some(completion),
        }));

        for (index, promise) in promises.into_iter().enumerate() {
            let gather = gather.clone();
            promise.subscribe(move |outcome| {
                let mut shared = gather.lock();
                match outcome {
                    Ok(value) => {
                        shared.values[index] = Some(value);
                        shared.remaining -= 1;
                        if shared.remaining > 0 {
                            return;
                        }
                        if let Some(completion) = shared.completion.take() {
                            let values: Vec<T> = shared.values.drain(..).flatten().collect();
                            drop(shared);
                            completion.resolve(values);
                        }
                    }
                    Err(reason) => {
                        if let Some(completion) = shared.completion.take() {
                            drop(shared);
                            completion.reject(reason);
                        }
                    }
                }
            });
        }
        all
    }

    /// Settle with whichever input settles first, resolved or rejected.
    /// No inputs rejects with [`PromiseError::EmptyRace`].
    pub fn race<I>(runtime: &Runtime, promises: I) -> Promise<T>
    where
        I: IntoIterator<Item = Promise<T>>,
    {
        let promises: Vec<_> = promises.into_iter().collect();
        if promises.is_empty() {
            return Promise::reject(runtime, PromiseError::EmptyRace);
        }

        let (completion, race) = Promise::pending(runtime);
        let gate = completion.shared();
        for promise in promises {
            let gate = gate.clone();
            promise.subscribe(move |outcome| {
                // Losers are expected to find the gate already settled.
                let _ = gate.try_settle(outcome);
            });
        }
        race
    }
}
