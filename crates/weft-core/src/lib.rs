//! Asynchronous dependency-graph evaluator.
//!
//! A [`Node`] is a handle to a single, lazily and at-most-once computed
//! value. Nodes compose into directed acyclic graphs: each node declares the
//! inputs it joins on, and the engine triggers its body only after every
//! required input has settled successfully with a value. On top of that core
//! sit combinators for transformation (`map`, `flat_map`, the n-ary forms),
//! conditional selection (`if_then_else` and friends), short-circuiting
//! boolean logic (eager and lazy `and`/`or`), and collection fan-in.
//!
//! ```no_run
//! use weft_core::{collect, value};
//!
//! # async fn demo() {
//! let total = collect(vec![value(1), value(2), value(3)])
//!     .map("sum", |xs: &Vec<i32>| xs.iter().sum::<i32>());
//! assert_eq!(total.apply().await.unwrap(), Some(6));
//! # }
//! ```
//!
//! Evaluation runs on tokio: `apply()` spawns the node's evaluation task and
//! returns an awaitable handle; sibling consumers of the same node share one
//! promise. Failures propagate verbatim through required edges, optional
//! edges absorb them into *absent*, and sinks fire after settlement without
//! ever being awaited.

mod boolean;
mod builder;
mod collect;
mod decider;
mod error;
mod events;
mod kind;
mod node;
mod service;
mod slot;
mod subgraph;
mod switch;
mod transform;
mod value;

pub use boolean::{and, and_lazy, equals, not, or, or_lazy};
pub use builder::{BoundSlot, Builder, bind, build_with};
pub use collect::{collect, collect_map, split_and_collect};
pub use decider::Decider;
pub use error::{BuildError, EmitError, EvalError, EvalResult};
pub use events::{DebugLevel, EventSink, MessageSink, NodeEvent, NodeEventKind, SettleStatus, with_sink};
pub use kind::{Inputs, NodeKind};
pub use node::{Handle, InputEdge, Node, NodeRef, Payload, Structure};
pub use service::{Service, call_service};
pub use slot::{DEFAULT_SLOTS, Slot};
pub use subgraph::Subgraph;
pub use switch::{
    if_success_then, if_success_then_else, if_then, if_then_else, is_successful, shadow_switch,
};
pub use transform::{
    flat_map2, flat_map3, flat_map4, flat_map5, flat_map6, flat_map7, flat_map8, map2, map3, map4,
    map5, map6, map7, map8,
};
pub use value::{
    absent, fail, false_node, no_value, true_node, value, value_from_supplier, value_named,
    wrap_future, wrap_try_future,
};

/// Commonly used items in one import.
pub mod prelude {
    pub use crate::boolean::{and, and_lazy, equals, not, or, or_lazy};
    pub use crate::builder::{Builder, bind, build_with};
    pub use crate::collect::{collect, collect_map, split_and_collect};
    pub use crate::decider::Decider;
    pub use crate::error::{BuildError, EmitError, EvalError, EvalResult};
    pub use crate::kind::{Inputs, NodeKind};
    pub use crate::node::{Node, NodeRef, Payload};
    pub use crate::slot::Slot;
    pub use crate::subgraph::Subgraph;
    pub use crate::switch::{if_success_then, if_success_then_else, if_then, if_then_else};
    pub use crate::value::{fail, no_value, value, value_from_supplier, wrap_future};
}
