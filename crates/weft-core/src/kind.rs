//! User-defined node kinds: declared slot sets plus an async evaluation body.

use std::any::Any;
use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{EvalError, EvalResult};
use crate::node::Payload;
use crate::slot::Slot;

/// Strip the module path off a type name for display.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// A node kind: the reusable definition behind builder-constructed nodes.
///
/// A kind declares its slot set once, statically, and consumes the joined
/// slot values in [`evaluate`](NodeKind::evaluate). Kinds must be
/// constructible without arguments to use [`Builder::of`](crate::Builder::of);
/// otherwise callers pass a pre-constructed instance.
#[async_trait]
pub trait NodeKind: Send + Sync + 'static {
    type Output: Payload;

    /// Display name; defaults to the kind's type name.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    /// The declared slot set. Fixed for the lifetime of the kind.
    fn slots(&self) -> &'static [Slot];

    /// Whether a vacant evaluation result is a legal settlement.
    fn null_admissible(&self) -> bool {
        false
    }

    /// Runs once all bound slots have settled and required slots carry
    /// values. Returning `Ok(None)` is the vacant result.
    async fn evaluate(&self, inputs: &Inputs) -> EvalResult<Option<Self::Output>>;
}

/// The settled slot values handed to a kind's body.
///
/// Values are looked up by slot id and recovered by type; a mismatch between
/// the bound node's value type and the requested one surfaces as an
/// evaluation error rather than a panic.
pub struct Inputs {
    node: String,
    slots: HashMap<&'static str, Option<Box<dyn Any + Send + Sync>>>,
}

impl Inputs {
    pub(crate) fn new(node: String) -> Self {
        Inputs {
            node,
            slots: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, slot: &'static str, value: Option<Box<dyn Any + Send + Sync>>) {
        self.slots.insert(slot, value);
    }

    /// Read a required slot. The engine fails the node before the body runs
    /// when a required slot is vacant, so this only errors on programming
    /// mistakes: an unknown slot id or a value-type mismatch.
    pub fn required<T: Payload>(&self, slot: &str) -> EvalResult<T> {
        match self.slots.get(slot) {
            Some(Some(any)) => any.downcast_ref::<T>().cloned().ok_or_else(|| {
                EvalError::Evaluate {
                    node: self.node.clone(),
                    message: format!("slot `{slot}` holds a different value type"),
                }
            }),
            Some(None) => Err(EvalError::MissingInput {
                node: self.node.clone(),
                slot: slot.to_string(),
            }),
            None => Err(EvalError::Evaluate {
                node: self.node.clone(),
                message: format!("unknown slot `{slot}`"),
            }),
        }
    }

    /// Read an optional slot; absent, vacant, and failed-then-shielded edges
    /// all read as `None`.
    pub fn optional<T: Payload>(&self, slot: &str) -> Option<T> {
        match self.slots.get(slot) {
            Some(Some(any)) => {
                let value = any.downcast_ref::<T>().cloned();
                if value.is_none() {
                    tracing::warn!(
                        node = %self.node,
                        slot,
                        "optional slot holds a different value type; reading as absent"
                    );
                }
                value
            }
            _ => None,
        }
    }

    /// Read an optional slot with a fallback.
    pub fn optional_or<T: Payload>(&self, slot: &str, default: T) -> T {
        self.optional(slot).unwrap_or(default)
    }
}
