//! Predicate-gated selection: `if_then_else` and its derivatives.

use crate::node::{EdgeKind, JoinEdge, Node, Parts, Payload};
use crate::value::no_value;

/// A node whose sole join dependency is `condition`. Once the condition
/// settles true the `on_true` branch is applied and its outcome becomes the
/// result; otherwise `on_false` is. The unchosen branch is never applied.
pub fn if_then_else<T: Payload>(
    condition: &Node<bool>,
    on_true: &Node<T>,
    on_false: &Node<T>,
) -> Node<T> {
    let name = format!(
        "IF::{}({}, {})",
        condition.name(),
        on_true.name(),
        on_false.name()
    );
    let cond = condition.clone();
    let yes = on_true.clone();
    let no = on_false.clone();
    let mut parts = Parts::new(
        name,
        Box::new(move || {
            Box::pin(async move {
                let chosen = if cond.settled_required("condition")? {
                    yes
                } else {
                    no
                };
                chosen.apply().await
            })
        }),
    );
    parts.can_emit_null = on_true.is_null_admissible() || on_false.is_null_admissible();
    parts.join = vec![JoinEdge {
        label: "condition".into(),
        kind: EdgeKind::Required,
        node: condition.to_ref(),
    }];
    parts.extra_inputs = vec![
        ("TRUE".into(), on_true.to_ref()),
        ("FALSE".into(), on_false.to_ref()),
    ];
    Node::from_parts(parts)
}

/// `if_then_else` with a vacant false branch.
pub fn if_then<T: Payload>(condition: &Node<bool>, on_true: &Node<T>) -> Node<T> {
    if_then_else(condition, on_true, &no_value())
}

/// A boolean probe of a node's success: true when `node` settles with a
/// value, false on failure or vacancy. Always succeeds itself.
pub fn is_successful<T: Payload>(node: &Node<T>) -> Node<bool> {
    let shielded = Node::optional(node.clone());
    let name = format!("SUCCESS::{}", node.name());
    let probe = shielded.clone();
    let mut parts = Parts::new(
        name,
        Box::new(move || {
            let out = probe.settled_value().map(|opt| Some(opt.is_some()));
            Box::pin(std::future::ready(out))
        }),
    );
    parts.join = vec![JoinEdge {
        label: "tested".into(),
        kind: EdgeKind::Tolerant,
        node: shielded.to_ref(),
    }];
    Node::from_parts(parts)
}

/// Select `on_true` when `test` succeeds with a value, `on_false` otherwise.
pub fn if_success_then_else<T: Payload, S: Payload>(
    test: &Node<S>,
    on_true: &Node<T>,
    on_false: &Node<T>,
) -> Node<T> {
    if_then_else(&is_successful(test), on_true, on_false)
}

/// Select `on_true` when `test` succeeds with a value; vacant otherwise.
pub fn if_success_then<T: Payload, S: Payload>(test: &Node<S>, on_true: &Node<T>) -> Node<T> {
    if_then(&is_successful(test), on_true)
}

/// A switch that *always* applies both branches and awaits both settlements,
/// returning only the result selected by the condition. Used for shadow
/// traffic, where the unselected branch must still run to completion.
pub fn shadow_switch<T: Payload>(
    condition: &Node<bool>,
    on_true: &Node<T>,
    on_false: &Node<T>,
) -> Node<T> {
    let name = format!(
        "SHADOW::{}({}, {})",
        condition.name(),
        on_true.name(),
        on_false.name()
    );
    let cond = condition.clone();
    let yes = on_true.clone();
    let no = on_false.clone();
    let mut parts = Parts::new(
        name,
        Box::new(move || {
            Box::pin(async move {
                let pick_true = cond.settled_required("condition")?;
                let (true_result, false_result) = futures::join!(yes.apply(), no.apply());
                if pick_true { true_result } else { false_result }
            })
        }),
    );
    parts.can_emit_null = on_true.is_null_admissible() || on_false.is_null_admissible();
    parts.join = vec![JoinEdge {
        label: "condition".into(),
        kind: EdgeKind::Required,
        node: condition.to_ref(),
    }];
    parts.extra_inputs = vec![
        ("TRUE".into(), on_true.to_ref()),
        ("FALSE".into(), on_false.to_ref()),
    ];
    Node::from_parts(parts)
}

impl<T: Payload> Node<T> {
    /// This node's value when the condition holds; vacant otherwise.
    pub fn when(&self, condition: &Node<bool>) -> Node<T> {
        if_then(condition, self)
    }

    /// This node's value when the condition does not hold; vacant otherwise.
    pub fn unless(&self, condition: &Node<bool>) -> Node<T> {
        if_then(&crate::boolean::not(condition), self)
    }

    /// This node's value when `condition` settles successfully with a value;
    /// vacant otherwise.
    pub fn when_success<S: Payload>(&self, condition: &Node<S>) -> Node<T> {
        if_success_then(condition, self)
    }

    /// This node's value when it succeeds with a value, the other node's
    /// otherwise.
    pub fn or_else(&self, other: &Node<T>) -> Node<T> {
        if_success_then_else(self, self, other)
    }
}
