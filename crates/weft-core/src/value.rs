//! Leaf nodes: fixed values, suppliers, wrapped futures, and literals.

use std::sync::Mutex;

use crate::error::{EvalError, EvalResult};
use crate::kind::short_type_name;
use crate::node::{Node, Parts, Payload};

/// A node with a fixed value. Its promise is settled at construction, so
/// `emit()` works immediately.
pub fn value<T: Payload>(value: T) -> Node<T> {
    value_named(value, format!("value[{}]", short_type_name::<T>()))
}

/// A fixed-value node with an explicit display name.
pub fn value_named<T: Payload>(value: T, name: impl Into<String>) -> Node<T> {
    Node::from_settled(name, false, Ok(Some(value)))
}

/// A node computed by a supplier on first use. The supplier runs at most
/// once, on the node's evaluation task, even under concurrent applies.
pub fn value_from_supplier<T: Payload, F>(name: impl Into<String>, supplier: F) -> Node<T>
where
    F: FnOnce() -> T + Send + 'static,
{
    let supplier = Mutex::new(Some(supplier));
    let mut parts = Parts::new(
        name,
        Box::new(move || {
            let supplier = supplier
                .lock()
                .expect("supplier lock")
                .take()
                .expect("supplier already consumed");
            Box::pin(std::future::ready(Ok(Some(supplier()))))
        }),
    );
    parts.can_emit_null = true;
    Node::from_parts(parts)
}

/// Adapt an external asynchronous producer into a node.
pub fn wrap_future<T, F>(name: impl Into<String>, future: F) -> Node<T>
where
    T: Payload,
    F: Future<Output = T> + Send + 'static,
{
    let mut parts = Parts::new(
        name,
        Box::new(move || Box::pin(async move { Ok(Some(future.await)) })),
    );
    parts.can_emit_null = true;
    Node::from_parts(parts)
}

/// Adapt a fallible asynchronous producer into a node; errors settle the
/// promise as failures.
pub fn wrap_try_future<T, F>(name: impl Into<String>, future: F) -> Node<T>
where
    T: Payload,
    F: Future<Output = EvalResult<T>> + Send + 'static,
{
    let mut parts = Parts::new(
        name,
        Box::new(move || Box::pin(async move { future.await.map(Some) })),
    );
    parts.can_emit_null = true;
    Node::from_parts(parts)
}

/// A node that settles with the given error on first apply.
pub fn fail<T: Payload>(error: EvalError) -> Node<T> {
    let parts = Parts::new(
        "fail",
        Box::new(move || Box::pin(std::future::ready(Err(error)))),
    );
    Node::from_parts(parts)
}

/// An optional-wrapped node that always reads as absent.
pub fn absent<T: Payload>() -> Node<T> {
    Node::from_settled("ABSENT", true, Ok(None))
}

/// A plain node with a vacant (null) value. Any node that requires this one
/// as an input will fail with a missing-input error.
pub fn no_value<T: Payload>() -> Node<T> {
    Node::from_settled("null", false, Ok(None))
}

/// The boolean `true` literal.
pub fn true_node() -> Node<bool> {
    value_named(true, "trueNode")
}

/// The boolean `false` literal.
pub fn false_node() -> Node<bool> {
    value_named(false, "falseNode")
}
