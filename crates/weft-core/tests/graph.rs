//! End-to-end graph scenarios: builder-constructed kinds, failure
//! propagation, gating, sinks, and ordering.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use weft_core::{
    BuildError, Builder, Decider, EvalError, EvalResult, Inputs, Node, NodeKind, Slot, and_lazy,
    bind, build_with, fail, false_node, no_value, or, value, value_from_supplier,
};

/// Sums its inputs with positional weights; the fourth input is optional and
/// weighted by 1000 when present.
#[derive(Default)]
struct Sum;

const SUM_SLOTS: &[Slot] = &[
    Slot::required("first"),
    Slot::required("second"),
    Slot::required("third"),
    Slot::optional("fourth"),
];

#[async_trait]
impl NodeKind for Sum {
    type Output = i64;

    fn name(&self) -> &str {
        "Sum"
    }

    fn slots(&self) -> &'static [Slot] {
        SUM_SLOTS
    }

    async fn evaluate(&self, inputs: &Inputs) -> EvalResult<Option<i64>> {
        let first: i64 = inputs.required("first")?;
        let second: i64 = inputs.required("second")?;
        let third: i64 = inputs.required("third")?;
        let fourth = inputs.optional::<i64>("fourth").unwrap_or(0);
        Ok(Some(first + 10 * second + 100 * third + 1000 * fourth))
    }
}

#[tokio::test]
async fn sum_with_all_slots_bound() {
    let node = Builder::<Sum>::of()
        .depends_on("first", &value(1_i64))
        .depends_on("second", &value(2_i64))
        .depends_on("third", &value(3_i64))
        .depends_on("fourth", &value(4_i64))
        .build()
        .unwrap();
    assert_eq!(node.apply().await.unwrap(), Some(4321));
    assert_eq!(node.emit().unwrap(), Some(4321));
}

#[tokio::test]
async fn sum_with_optional_slot_omitted() {
    let node = build_with(
        Sum,
        [
            bind("first", &value(1_i64)),
            bind("second", &value(2_i64)),
            bind("third", &value(3_i64)),
        ],
    )
    .unwrap();
    assert_eq!(node.apply().await.unwrap(), Some(321));
}

#[tokio::test]
async fn sum_accepts_a_prewrapped_optional_binding() {
    let node = Builder::<Sum>::of()
        .depends_on("first", &value(1_i64))
        .depends_on("second", &value(2_i64))
        .depends_on("third", &value(3_i64))
        .depends_on("fourth", &Node::optional(value(4_i64)))
        .build()
        .unwrap();
    assert_eq!(node.apply().await.unwrap(), Some(4321));
}

#[tokio::test]
async fn missing_required_slots_are_named() {
    let err = Builder::<Sum>::of()
        .depends_on("first", &value(1_i64))
        .depends_on("fourth", &value(4_i64))
        .build()
        .unwrap_err();
    match err {
        BuildError::MissingSlots { kind, slots } => {
            assert_eq!(kind, "Sum");
            assert_eq!(slots, vec!["second".to_string(), "third".to_string()]);
        }
        other => panic!("expected missing slots, got {other}"),
    }
}

#[tokio::test]
async fn unknown_and_duplicate_slots_are_build_errors() {
    let err = Builder::<Sum>::of()
        .depends_on("fifth", &value(1_i64))
        .build()
        .unwrap_err();
    assert!(matches!(err, BuildError::UnknownSlot { slot, .. } if slot == "fifth"));

    let err = Builder::<Sum>::of()
        .depends_on("first", &value(1_i64))
        .depends_on("first", &value(2_i64))
        .build()
        .unwrap_err();
    assert!(matches!(err, BuildError::DuplicateSlot { slot, .. } if slot == "first"));
}

#[tokio::test]
async fn required_failure_propagates_verbatim() {
    let upstream = EvalError::new("index unavailable");
    let node = Builder::<Sum>::of()
        .depends_on("first", &value(1_i64))
        .depends_on("second", &value(2_i64))
        .depends_on("third", &fail::<i64>(upstream.clone()))
        .depends_on("fourth", &value(4_i64))
        .build()
        .unwrap();
    assert_eq!(node.apply().await, Err(upstream));
}

#[tokio::test]
async fn optional_failure_is_absorbed_into_absent() {
    let node = Builder::<Sum>::of()
        .depends_on("first", &value(1_i64))
        .depends_on("second", &value(2_i64))
        .depends_on("third", &value(3_i64))
        .depends_on("fourth", &fail::<i64>(EvalError::new("score service down")))
        .build()
        .unwrap();
    assert_eq!(node.apply().await.unwrap(), Some(321));
}

#[tokio::test]
async fn required_vacant_input_names_its_slot() {
    let node = Builder::<Sum>::of()
        .depends_on("first", &value(1_i64))
        .depends_on("second", &no_value::<i64>())
        .depends_on("third", &value(3_i64))
        .build()
        .unwrap();
    match node.apply().await {
        Err(EvalError::MissingInput { slot, .. }) => assert_eq!(slot, "second"),
        other => panic!("expected missing input, got {other:?}"),
    }
}

#[tokio::test]
async fn decider_off_fails_plain_nodes_and_blanks_wrapped_ones() {
    let gated = Builder::<Sum>::of()
        .depends_on("first", &value(1_i64))
        .depends_on("second", &value(2_i64))
        .depends_on("third", &value(3_i64))
        .gated_by(Decider::always_off())
        .build()
        .unwrap();
    match gated.apply().await {
        Err(EvalError::GatedOff { key, .. }) => assert_eq!(key, "always_off"),
        other => panic!("expected gated-off failure, got {other:?}"),
    }

    let wrapped = Node::optional(
        Builder::<Sum>::of()
            .depends_on("first", &value(1_i64))
            .depends_on("second", &value(2_i64))
            .depends_on("third", &value(3_i64))
            .gated_by(Decider::always_off())
            .build()
            .unwrap(),
    );
    assert_eq!(wrapped.apply().await.unwrap(), None);
}

#[tokio::test]
async fn decider_on_lets_the_body_run() {
    let node = Builder::<Sum>::of()
        .depends_on("first", &value(1_i64))
        .depends_on("second", &value(2_i64))
        .depends_on("third", &value(3_i64))
        .gated_by(Decider::always_on())
        .build()
        .unwrap();
    assert_eq!(node.apply().await.unwrap(), Some(321));
}

/// A kind that yields a vacant result without being null-admissible.
#[derive(Default)]
struct Hollow;

const HOLLOW_SLOTS: &[Slot] = &[Slot::required("input")];

#[async_trait]
impl NodeKind for Hollow {
    type Output = String;

    fn slots(&self) -> &'static [Slot] {
        HOLLOW_SLOTS
    }

    async fn evaluate(&self, _inputs: &Inputs) -> EvalResult<Option<String>> {
        Ok(None)
    }
}

#[tokio::test]
async fn vacant_body_result_fails_non_admissible_nodes() {
    let node = Builder::<Hollow>::of()
        .depends_on("input", &value(1))
        .build()
        .unwrap();
    assert!(matches!(
        node.apply().await,
        Err(EvalError::VacantResult { .. })
    ));
}

#[tokio::test]
async fn body_errors_are_wrapped_with_the_node_name() {
    #[derive(Default)]
    struct Explosive;

    const EXPLOSIVE_SLOTS: &[Slot] = &[Slot::required("input")];

    #[async_trait]
    impl NodeKind for Explosive {
        type Output = i32;

        fn slots(&self) -> &'static [Slot] {
            EXPLOSIVE_SLOTS
        }

        async fn evaluate(&self, _inputs: &Inputs) -> EvalResult<Option<i32>> {
            Err(EvalError::new("kaboom"))
        }
    }

    let node = Builder::<Explosive>::of()
        .depends_on("input", &value(1))
        .with_key("a")
        .build()
        .unwrap();
    match node.apply().await {
        Err(EvalError::Evaluate { node, message }) => {
            assert_eq!(node, "Explosive:a");
            assert_eq!(message, "kaboom");
        }
        other => panic!("expected wrapped body error, got {other:?}"),
    }
}

#[tokio::test]
async fn sinks_fire_after_settlement_even_on_failure() {
    let fired = Arc::new(AtomicUsize::new(0));

    let make_sink = |fired: &Arc<AtomicUsize>| {
        let fired = fired.clone();
        value_from_supplier("sink", move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    };

    let ok = Builder::<Sum>::of()
        .depends_on("first", &value(1_i64))
        .depends_on("second", &value(2_i64))
        .depends_on("third", &value(3_i64))
        .with_sinks([make_sink(&fired).to_ref()])
        .build()
        .unwrap();
    assert_eq!(ok.apply().await.unwrap(), Some(321));

    let broken = Builder::<Sum>::of()
        .depends_on("first", &fail::<i64>(EvalError::new("down")))
        .depends_on("second", &value(2_i64))
        .depends_on("third", &value(3_i64))
        .with_sinks([make_sink(&fired).to_ref()])
        .build()
        .unwrap();
    assert!(broken.apply().await.is_err());

    // Sinks are kicked, not awaited; give them a beat to run.
    for _ in 0..50 {
        if fired.load(Ordering::SeqCst) == 2 {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn slow_sinks_do_not_delay_the_producer() {
    let producer = value(10).map("bump", |v: &i32| v + 1);
    let slow_sink = producer.clone().flat_map("slow", |_: &i32| async {
        sleep(Duration::from_secs(30)).await;
        Ok(0)
    });
    producer.attach_sinks([slow_sink.to_ref()]);

    let out = tokio::time::timeout(Duration::from_secs(1), producer.apply())
        .await
        .expect("producer must settle without waiting for its sink");
    assert_eq!(out.unwrap(), Some(11));
}

#[tokio::test]
async fn lazy_and_short_circuit_skips_side_effects() {
    let recorded = Arc::new(AtomicUsize::new(0));
    let probe = recorded.clone();
    let recording_true = value_from_supplier("record", move || {
        probe.fetch_add(1, Ordering::SeqCst);
        true
    });

    let node = and_lazy(vec![false_node(), recording_true]).unwrap();
    assert_eq!(node.apply().await.unwrap(), Some(false));
    sleep(Duration::from_millis(20)).await;
    assert_eq!(recorded.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn eager_or_observes_both_recordings() {
    let recorded = Arc::new(AtomicUsize::new(0));
    let recording_false = |recorded: &Arc<AtomicUsize>| {
        let probe = recorded.clone();
        value_from_supplier("record", move || {
            probe.fetch_add(1, Ordering::SeqCst);
            false
        })
    };

    let node = or(vec![recording_false(&recorded), recording_false(&recorded)]).unwrap();
    assert_eq!(node.apply().await.unwrap(), Some(false));
    assert_eq!(recorded.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn wait_on_observes_every_side_effect_before_resolving() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let mark = |tag: &'static str| {
        let log = log.clone();
        value_from_supplier(tag, move || {
            log.lock().unwrap().push(tag);
            tag
        })
    };
    let marks = [mark("m1"), mark("m2"), mark("m3")];

    let append_log = log.clone();
    let target = value(999).map("append", move |v: &i32| {
        append_log.lock().unwrap().push("target");
        *v
    });

    let node = target
        .wait_on(marks.iter().map(|m| m.to_ref()))
        .unwrap();
    assert_eq!(node.apply().await.unwrap(), Some(999));
    assert_eq!(node.emit().unwrap(), Some(999));
    assert_eq!(log.lock().unwrap().len(), 4, "all four appends observed");
}
