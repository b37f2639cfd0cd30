//! Concurrency properties: at-most-once evaluation and promise stability
//! under racing callers, driven through explicitly built runtimes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use proptest::prelude::*;
use tokio::runtime::Builder as RuntimeBuilder;
use weft_core::{EvalError, fail, value, value_from_supplier};

#[test]
fn body_runs_once_under_racing_appliers() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig {
        cases: 24,
        ..ProptestConfig::default()
    });
    let strategy = (2usize..=16, 0u64..=2);

    runner
        .run(&strategy, |(appliers, delay_ms)| {
            let runtime = RuntimeBuilder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .expect("tokio runtime");

            runtime.block_on(async move {
                let runs = Arc::new(AtomicUsize::new(0));
                let probe = runs.clone();
                let node = value(7).flat_map("counted", move |v: &i32| {
                    let v = *v;
                    async move {
                        probe.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        Ok(v * 3)
                    }
                });

                let mut tasks = Vec::with_capacity(appliers);
                for _ in 0..appliers {
                    let node = node.clone();
                    tasks.push(tokio::spawn(async move { node.apply().await }));
                }
                for task in tasks {
                    let settled = task.await.expect("applier task");
                    prop_assert_eq!(settled, Ok(Some(21)));
                }
                prop_assert_eq!(runs.load(Ordering::SeqCst), 1, "body ran more than once");
                Ok(())
            })
        })
        .unwrap();
}

#[test]
fn supplier_runs_once_under_racing_appliers() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig {
        cases: 24,
        ..ProptestConfig::default()
    });

    runner
        .run(&(2usize..=12), |appliers| {
            let runtime = RuntimeBuilder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .expect("tokio runtime");

            runtime.block_on(async move {
                let calls = Arc::new(AtomicUsize::new(0));
                let probe = calls.clone();
                let node = value_from_supplier("counted", move || {
                    probe.fetch_add(1, Ordering::SeqCst);
                    99
                });

                let mut tasks = Vec::with_capacity(appliers);
                for _ in 0..appliers {
                    let node = node.clone();
                    tasks.push(tokio::spawn(async move { node.apply().await }));
                }
                for task in tasks {
                    prop_assert_eq!(task.await.expect("applier task"), Ok(Some(99)));
                }
                prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
                Ok(())
            })
        })
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_promises_are_stable_across_observers() {
    let err = EvalError::new("permanent failure");
    let node = fail::<String>(err.clone());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let node = node.clone();
        tasks.push(tokio::spawn(async move { node.apply().await }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), Err(err.clone()));
    }
    // Later observers see the identical settlement.
    assert_eq!(node.apply().await, Err(err));
}
