use promise_kit::{PoolConfig, Promise, PromiseError, Runtime, WorkerPool};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::{thread, time::Duration};

fn runtime() -> Runtime {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Runtime::new(WorkerPool::new(PoolConfig::unbounded()))
}

fn delayed(rt: &Runtime, value: u32, delay_ms: u64) -> Promise<u32> {
    Promise::new(rt, move |done| {
        thread::sleep(Duration::from_millis(delay_ms));
        done.resolve(value);
    })
}

#[test]
fn all_of_two_resolved() {
    let rt = runtime();
    let values = Promise::all(&rt, [Promise::resolve(&rt, 10), Promise::resolve(&rt, 20)])
        .wait()
        .unwrap();
    assert_eq!(values, [10, 20]);
}

#[test]
fn all_keeps_input_order_not_completion_order() {
    let rt = runtime();
    let values = Promise::all(
        &rt,
        vec![delayed(&rt, 1, 60), delayed(&rt, 2, 30), delayed(&rt, 3, 0)],
    )
    .wait()
    .unwrap();
    assert_eq!(values, [1, 2, 3]);
}

#[test]
fn all_of_nothing() {
    let rt = runtime();
    let values = Promise::<u8>::all(&rt, Vec::new()).wait().unwrap();
    assert!(values.is_empty());
}

#[test]
fn all_rejects_with_first_rejection_and_does_not_cancel() {
    let rt = runtime();
    let finished = Arc::new(AtomicUsize::new(0));
    let f = finished.clone();
    let slow = Promise::new(&rt, move |done| {
        thread::sleep(Duration::from_millis(50));
        f.fetch_add(1, Ordering::SeqCst);
        done.resolve(1);
    });
    let failing = Promise::new(&rt, |done| {
        thread::sleep(Duration::from_millis(10));
        done.reject(anyhow::anyhow!("first failure"));
    });
    let late_failure = Promise::new(&rt, |done| {
        thread::sleep(Duration::from_millis(30));
        done.reject(anyhow::anyhow!("second failure"));
    });

    let err = Promise::all(&rt, vec![slow, failing, late_failure])
        .wait()
        .unwrap_err();
    assert_eq!(err.to_string(), "first failure");

    // The slow input keeps running after the aggregate rejected.
    for _ in 0..200 {
        if finished.load(Ordering::SeqCst) == 1 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
fn race_takes_first_settled() {
    let rt = runtime();
    let winner = Promise::race(&rt, vec![delayed(&rt, 1, 80), delayed(&rt, 2, 0)])
        .wait()
        .unwrap();
    assert_eq!(winner, 2);
}

#[test]
fn race_can_be_won_by_a_rejection() {
    let rt = runtime();
    let err = Promise::race(
        &rt,
        vec![delayed(&rt, 1, 80), Promise::reject(&rt, anyhow::anyhow!("fast no"))],
    )
    .wait()
    .unwrap_err();
    assert_eq!(err.to_string(), "fast no");
}

#[test]
fn race_of_nothing() {
    let rt = runtime();
    let err = Promise::<u8>::race(&rt, Vec::new()).wait().unwrap_err();
    assert_eq!(err.downcast_ref::<PromiseError>(), Some(&PromiseError::EmptyRace));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn all_preserves_positions(delays in prop::collection::vec(0u64..4, 0..8)) {
        let rt = runtime();
        let promises: Vec<_> = delays
            .iter()
            .enumerate()
            .map(|(i, &d)| delayed(&rt, i as u32, d))
            .collect();
        let values = Promise::all(&rt, promises).wait().unwrap();
        let expected: Vec<u32> = (0..delays.len() as u32).collect();
        prop_assert_eq!(values, expected);
    }
}
