#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use promise_kit::{
        PoolConfig, Promise, PromiseError, PromiseState, Runtime, RuntimeConfig, WorkerPool,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::{thread, time::Duration};

    fn init_logging() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn runtime() -> Runtime {
        init_logging();
        Runtime::new(WorkerPool::new(PoolConfig::unbounded()))
    }

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("network down")]
    struct NetworkDown;

    #[test]
    fn executor_resolve_is_observed() {
        let rt = runtime();
        let value = Promise::new(&rt, |done| done.resolve(String::from("🍓")))
            .wait()
            .unwrap();
        assert_eq!(value, "🍓");
    }

    #[test]
    fn executor_reject_is_observed() {
        let rt = runtime();
        let err = Promise::<u8>::new(&rt, |done| done.reject(NetworkDown))
            .wait()
            .unwrap_err();
        assert_eq!(err.downcast_ref::<NetworkDown>(), Some(&NetworkDown));
    }

    #[test]
    fn resolved_then_identity() {
        let rt = runtime();
        let value = Promise::resolve(&rt, 5).then(|v| Ok(v)).wait().unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn rejected_runs_only_on_rejected() {
        let rt = runtime();
        let resolved_calls = Arc::new(AtomicUsize::new(0));
        let calls = resolved_calls.clone();
        let recovered = Promise::<u8>::reject(&rt, NetworkDown)
            .then_or_else(
                move |v| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(format!("value {v}"))
                },
                |e| Ok(format!("recovered from {e}")),
            )
            .wait()
            .unwrap();
        assert_eq!(recovered, "recovered from network down");
        assert_eq!(resolved_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejection_passes_through_then() {
        let rt = runtime();
        let touched = Arc::new(AtomicUsize::new(0));
        let t1 = touched.clone();
        let t2 = touched.clone();
        let err = Promise::<u8>::reject(&rt, NetworkDown)
            .then(move |v| {
                t1.fetch_add(1, Ordering::SeqCst);
                Ok(v + 1)
            })
            .and_then(move |v| {
                t2.fetch_add(1, Ordering::SeqCst);
                Promise::resolve(&runtime(), v)
            })
            .wait()
            .unwrap_err();
        assert_eq!(err.downcast_ref::<NetworkDown>(), Some(&NetworkDown));
        assert_eq!(touched.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_error_rejects_downstream() {
        let rt = runtime();
        let err = Promise::resolve(&rt, 3)
            .then(|v| -> anyhow::Result<u8> { anyhow::bail!("bad value {v}") })
            .then(|v| Ok(v * 2))
            .wait()
            .unwrap_err();
        assert_eq!(err.to_string(), "bad value 3");
    }

    #[test]
    fn flattening_matches_plain_then() {
        let rt = runtime();
        let f = |v: i32| v * 3 + 1;

        let flat = {
            let rt2 = rt.clone();
            Promise::resolve(&rt, 4)
                .and_then(move |v| Promise::resolve(&rt2, f(v)))
                .wait()
                .unwrap()
        };
        let plain = Promise::resolve(&rt, 4).then(move |v| Ok(f(v))).wait().unwrap();
        assert_eq!(flat, plain);
        assert_eq!(flat, 13);
    }

    #[test]
    fn and_then_waits_for_inner_async_promise() {
        let rt = runtime();
        let rt2 = rt.clone();
        let value = Promise::resolve(&rt, 1)
            .and_then(move |v| {
                Promise::new(&rt2, move |done| {
                    thread::spawn(move || {
                        thread::sleep(Duration::from_millis(20));
                        done.resolve(v + 41);
                    });
                })
            })
            .then(|v| Ok(v.to_string()))
            .wait()
            .unwrap();
        assert_eq!(value, "42");
    }

    #[test]
    fn or_else_recovers_with_promise() {
        let rt = runtime();
        let rt2 = rt.clone();
        let value = Promise::<u8>::reject(&rt, NetworkDown)
            .or_else(move |_| Promise::resolve(&rt2, 9))
            .wait()
            .unwrap();
        assert_eq!(value, 9);
    }

    #[test]
    fn catch_leaves_values_alone() {
        let rt = runtime();
        let value = Promise::resolve(&rt, 1)
            .catch(|_| Ok(0))
            .wait()
            .unwrap();
        assert_eq!(value, 1);
    }

    #[test]
    fn callback_style_producer() {
        let rt = runtime();
        let (done, promise) = Promise::<u32>::pending(&rt);
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            done.resolve(42);
        });
        let consumer = thread::spawn(move || block_on(async { promise.await.unwrap() }));
        producer.join().expect("The producer thread has panicked");
        assert_eq!(consumer.join().expect("The consumer thread has panicked"), 42);
    }

    #[test]
    fn shared_gate_keeps_first_settlement() {
        let rt = runtime();
        let (done, promise) = Promise::<&str>::pending(&rt);
        let gate = done.shared();
        let on_failure = gate.clone();

        gate.try_resolve("first").unwrap();
        assert_eq!(
            on_failure.try_reject(NetworkDown),
            Err(PromiseError::AlreadySettled)
        );
        assert_eq!(gate.try_resolve("second"), Err(PromiseError::AlreadySettled));
        assert_eq!(promise.state(), PromiseState::Resolved);
        assert_eq!(promise.wait().unwrap(), "first");
    }

    #[test]
    #[should_panic(expected = "promise already settled")]
    fn shared_gate_double_resolve_panics() {
        let rt = runtime();
        let (done, _promise) = Promise::<u8>::pending(&rt);
        let gate = done.shared();
        gate.resolve(1);
        gate.reject(NetworkDown);
    }

    #[test]
    fn concurrent_settlers_have_one_winner() {
        let rt = runtime();
        let (done, promise) = Promise::<usize>::pending(&rt);
        let gate = done.shared();
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let gate = gate.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    gate.try_resolve(i).is_ok()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("settler thread panicked"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(promise.wait().unwrap() < 8);
    }

    #[test]
    fn dropped_gate_rejects_with_abandoned() {
        let rt = runtime();
        let (done, promise) = Promise::<u8>::pending(&rt);
        let gate = done.shared();
        let other = gate.clone();
        drop(gate);
        assert_eq!(promise.state(), PromiseState::Pending);
        drop(other);
        assert_eq!(promise.state(), PromiseState::Rejected);
        let err = promise.wait().unwrap_err();
        assert_eq!(err.downcast_ref::<PromiseError>(), Some(&PromiseError::Abandoned));
    }

    #[test]
    fn panicking_executor_is_abandoned() {
        let rt = runtime();
        let err = Promise::<u8>::new(&rt, |_done| panic!("executor blew up"))
            .wait()
            .unwrap_err();
        assert_eq!(err.downcast_ref::<PromiseError>(), Some(&PromiseError::Abandoned));
    }

    #[test]
    fn shut_down_pool_abandons_instead_of_hanging() {
        init_logging();
        let (rt, pool) = Runtime::from_config(&RuntimeConfig::default()).unwrap();
        pool.shutdown();
        let err = Promise::resolve(&rt, 1)
            .then(|v| Ok(v + 1))
            .wait()
            .unwrap_err();
        assert_eq!(err.downcast_ref::<PromiseError>(), Some(&PromiseError::Abandoned));
    }

    #[test]
    fn bounded_runtime_from_toml() {
        init_logging();
        let config = RuntimeConfig::from_toml_str("[pool]\nmax_threads = 2\ncore_threads = 2\n")
            .unwrap();
        let (rt, pool) = Runtime::from_config(&config).unwrap();
        let promises = (0..100u32).map(|i| {
            Promise::new(&rt, move |done| done.resolve(i)).then(|v| Ok(v * 2))
        });
        let values = Promise::all(&rt, promises).wait().unwrap();
        assert_eq!(values, (0..100).map(|i| i * 2).collect::<Vec<_>>());
        assert!(pool.stats().workers <= 2);
        pool.shutdown();
    }

    #[test]
    fn awaiting_inside_async_block() {
        let rt = runtime();
        let rt2 = rt.clone();
        let total = block_on(async move {
            let a = Promise::resolve(&rt, 2).await?;
            let b = Promise::new(&rt2, move |done| done.resolve(a * 20)).await?;
            anyhow::Ok(a + b)
        })
        .unwrap();
        assert_eq!(total, 42);
    }
}
