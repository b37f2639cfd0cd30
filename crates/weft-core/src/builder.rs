//! Builder: binds child nodes to a kind's declared slots and validates the
//! result before any evaluation is scheduled.

use std::collections::HashSet;
use std::sync::Arc;

use crate::decider::Decider;
use crate::error::{BuildError, EvalError};
use crate::kind::{Inputs, NodeKind};
use crate::node::{EdgeKind, JoinEdge, Node, NodeRef, Parts, Payload, absent_sentinel};

/// A slot binding: one (slot id, child node) pair, with the shielded form of
/// the child prepared in case the slot turns out to be optional.
pub struct BoundSlot {
    slot: String,
    plain: NodeRef,
    shielded: NodeRef,
    already_optional: bool,
}

/// Bind a child node to a slot by id. Pairing slot and node in one value is
/// what keeps positional construction well-formed by construction.
pub fn bind<T: Payload>(slot: impl Into<String>, node: &Node<T>) -> BoundSlot {
    BoundSlot {
        slot: slot.into(),
        plain: node.to_ref(),
        shielded: Node::optional(node.clone()).to_ref(),
        already_optional: node.is_optional(),
    }
}

/// Builds a node of a given kind from named slot bindings.
///
/// Binding an optional slot shields the edge: failure or vacancy of the child
/// reads as absent instead of propagating. Validation happens in
/// [`build`](Builder::build): unknown slots, double bindings, and unbound
/// required slots are all reported there, naming the offending slot ids.
pub struct Builder<K: NodeKind> {
    kind: Arc<K>,
    bindings: Vec<BoundSlot>,
    decider: Option<Decider>,
    sinks: Vec<NodeRef>,
    key: Option<String>,
}

impl<K: NodeKind> Builder<K> {
    /// Build from a pre-constructed kind instance.
    pub fn new(kind: K) -> Self {
        Builder {
            kind: Arc::new(kind),
            bindings: Vec::new(),
            decider: None,
            sinks: Vec::new(),
            key: None,
        }
    }

    /// Build from the kind's default constructor.
    pub fn of() -> Self
    where
        K: Default,
    {
        Builder::new(K::default())
    }

    /// Bind `node` to `slot`.
    pub fn depends_on<T: Payload>(mut self, slot: impl Into<String>, node: &Node<T>) -> Self {
        self.bindings.push(bind(slot, node));
        self
    }

    /// Bind a pre-erased slot binding.
    pub fn bound(mut self, binding: BoundSlot) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Gate the node's body behind a decider.
    pub fn gated_by(mut self, decider: Decider) -> Self {
        self.decider = Some(decider);
        self
    }

    /// Attach sinks, kicked off after the node settles.
    pub fn with_sinks(mut self, sinks: impl IntoIterator<Item = NodeRef>) -> Self {
        self.sinks.extend(sinks);
        self
    }

    /// Tag the instance with a key, appended to the display name.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Validate the bindings and construct the node.
    pub fn build(self) -> Result<Node<K::Output>, BuildError> {
        let kind_name = self.kind.name().to_string();
        let slots = self.kind.slots();

        let mut bound: Vec<(&'static str, NodeRef)> = Vec::with_capacity(slots.len());
        let mut seen: HashSet<&'static str> = HashSet::new();
        for binding in self.bindings {
            let Some(slot) = slots.iter().find(|s| s.id() == binding.slot) else {
                return Err(BuildError::UnknownSlot {
                    kind: kind_name,
                    slot: binding.slot,
                });
            };
            if !seen.insert(slot.id()) {
                return Err(BuildError::DuplicateSlot {
                    kind: kind_name,
                    slot: binding.slot,
                });
            }
            let node = if slot.is_optional() && !binding.already_optional {
                binding.shielded
            } else {
                binding.plain
            };
            bound.push((slot.id(), node));
        }

        let missing: Vec<String> = slots
            .iter()
            .filter(|slot| !slot.is_optional() && !seen.contains(slot.id()))
            .map(|slot| slot.id().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::MissingSlots {
                kind: kind_name,
                slots: missing,
            });
        }

        // Unfilled optional slots all share the absent sentinel.
        for slot in slots {
            if slot.is_optional() && !seen.contains(slot.id()) {
                bound.push((slot.id(), absent_sentinel()));
            }
        }

        // Join in declared slot order, not binding order.
        bound.sort_by_key(|(id, _)| {
            slots
                .iter()
                .position(|slot| slot.id() == *id)
                .unwrap_or(usize::MAX)
        });

        let display = match &self.key {
            Some(key) => format!("{kind_name}:{key}"),
            None => kind_name.clone(),
        };
        let join: Vec<JoinEdge> = bound
            .iter()
            .map(|(id, node)| {
                let optional = slots
                    .iter()
                    .find(|slot| slot.id() == *id)
                    .map(|slot| slot.is_optional())
                    .unwrap_or(false);
                JoinEdge {
                    label: (*id).to_string(),
                    kind: if optional {
                        EdgeKind::Shielded
                    } else {
                        EdgeKind::Required
                    },
                    node: node.clone(),
                }
            })
            .collect();

        let kind = self.kind;
        let can_emit_null = kind.null_admissible();
        let body_display = display;
        let mut parts = Parts::new(
            kind_name,
            Box::new(move || {
                Box::pin(async move {
                    let mut inputs = Inputs::new(body_display.clone());
                    for (id, node) in &bound {
                        inputs.insert(*id, node.cloned_value_any());
                    }
                    match kind.evaluate(&inputs).await {
                        // Generic errors raised by the body are re-raised
                        // wrapped with the node's name; structured engine
                        // errors already carry one.
                        Err(EvalError::Message(message)) => Err(EvalError::Evaluate {
                            node: body_display,
                            message: message.to_string(),
                        }),
                        other => other,
                    }
                })
            }),
        );
        parts.key = self.key;
        parts.can_emit_null = can_emit_null;
        parts.join = join;
        parts.decider = self.decider;
        parts.sinks = self.sinks;
        Ok(Node::from_parts(parts))
    }
}

/// Positional construction: `build_with(kind, [bind(slot, node), ...])`.
pub fn build_with<K: NodeKind>(
    kind: K,
    bindings: impl IntoIterator<Item = BoundSlot>,
) -> Result<Node<K::Output>, BuildError> {
    let mut builder = Builder::new(kind);
    for binding in bindings {
        builder = builder.bound(binding);
    }
    builder.build()
}
