//! Boolean combinators with eager and lazy parallelism over their operands.
//!
//! Both forms report the result of sequential left-to-right logical
//! evaluation. Eager forms start every operand up front and short-circuit the
//! *reported* result without cancelling work already in flight; lazy forms
//! start each operand only while the running result still permits it.

use crate::error::{BuildError, EvalError, EvalResult};
use crate::node::{EdgeKind, JoinEdge, Node, Parts, Payload};

#[derive(Clone, Copy)]
enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    fn base_name(self, lazy: bool) -> &'static str {
        match (self, lazy) {
            (BoolOp::And, false) => "AND",
            (BoolOp::And, true) => "AND-lazy",
            (BoolOp::Or, false) => "OR",
            (BoolOp::Or, true) => "OR-lazy",
        }
    }

    /// The value that short-circuits the evaluation, and therefore also the
    /// result when it is seen.
    fn short_circuit(self) -> bool {
        matches!(self, BoolOp::Or)
    }
}

fn boolean_node(op: BoolOp, operands: Vec<Node<bool>>, lazy: bool) -> Result<Node<bool>, BuildError> {
    if operands.len() < 2 {
        return Err(BuildError::BooleanArity {
            supplied: operands.len(),
        });
    }

    let merged = operands
        .iter()
        .map(|n| n.name())
        .collect::<Vec<_>>()
        .join(", ");
    let name = format!("{}::({merged})", op.base_name(lazy));
    let display = name.clone();

    // Only the first operand is a join dependency; the body walks the rest in
    // order. Applying an already-applied node hands back the same promise, so
    // the eager pre-start changes scheduling, never semantics.
    let join = vec![JoinEdge {
        label: "OP0".into(),
        kind: EdgeKind::Required,
        node: operands[0].to_ref(),
    }];
    let prestart = if lazy {
        Vec::new()
    } else {
        operands.iter().skip(1).map(|n| n.to_ref()).collect()
    };
    let extra_inputs = operands
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, n)| (format!("OP{i}"), n.to_ref()))
        .collect();

    let walked = operands.clone();
    let mut parts = Parts::new(
        name,
        Box::new(move || {
            Box::pin(async move {
                let stop_on = op.short_circuit();
                for (index, operand) in walked.iter().enumerate() {
                    let value = match operand.apply().await? {
                        Some(value) => value,
                        None => {
                            return Err(EvalError::MissingInput {
                                node: display,
                                slot: format!("OP{index}"),
                            });
                        }
                    };
                    if value == stop_on {
                        return Ok(Some(stop_on));
                    }
                }
                Ok(Some(!stop_on))
            })
        }),
    );
    parts.join = join;
    parts.prestart = prestart;
    parts.extra_inputs = extra_inputs;
    Ok(Node::from_parts(parts))
}

/// Eager conjunction: all operands start in parallel; the result is the
/// left-to-right conjunction, reported as soon as it is decided.
pub fn and(operands: Vec<Node<bool>>) -> Result<Node<bool>, BuildError> {
    boolean_node(BoolOp::And, operands, false)
}

/// Lazy conjunction: operands start strictly left to right, each only while
/// the running conjunction is still true.
pub fn and_lazy(operands: Vec<Node<bool>>) -> Result<Node<bool>, BuildError> {
    boolean_node(BoolOp::And, operands, true)
}

/// Eager disjunction; short-circuits on the first `true`.
pub fn or(operands: Vec<Node<bool>>) -> Result<Node<bool>, BuildError> {
    boolean_node(BoolOp::Or, operands, false)
}

/// Lazy disjunction.
pub fn or_lazy(operands: Vec<Node<bool>>) -> Result<Node<bool>, BuildError> {
    boolean_node(BoolOp::Or, operands, true)
}

/// Logical negation. Fails if the operand fails.
pub fn not(node: &Node<bool>) -> Node<bool> {
    let operand = node.clone();
    let mut parts = Parts::new(
        format!("NOT::{}", node.name()),
        Box::new(move || {
            let settled = operand.settled_required("operand").map(|v| Some(!v));
            Box::pin(std::future::ready(settled))
        }),
    );
    parts.join = vec![JoinEdge {
        label: "operand".into(),
        kind: EdgeKind::Required,
        node: node.to_ref(),
    }];
    Node::from_parts(parts)
}

/// True when both nodes settle with equal observations; vacant observations
/// compare equal to each other.
pub fn equals<T>(a: &Node<T>, b: &Node<T>) -> Node<bool>
where
    T: Payload + PartialEq,
{
    let left = a.clone();
    let right = b.clone();
    let mut parts = Parts::new(
        "Equals",
        Box::new(move || {
            let out = (|| -> EvalResult<Option<bool>> {
                let lhs = left.settled_value()?;
                let rhs = right.settled_value()?;
                Ok(Some(lhs == rhs))
            })();
            Box::pin(std::future::ready(out))
        }),
    );
    parts.join = vec![
        JoinEdge {
            label: "dep0".into(),
            kind: EdgeKind::Tolerant,
            node: a.to_ref(),
        },
        JoinEdge {
            label: "dep1".into(),
            kind: EdgeKind::Tolerant,
            node: b.to_ref(),
        },
    ];
    Node::from_parts(parts)
}
