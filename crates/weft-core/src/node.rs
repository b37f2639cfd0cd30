//! The node engine: one-shot result cells, dependency joins, gating, and the
//! at-most-once evaluation task behind every [`Node`] handle.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, join_all};
use once_cell::sync::Lazy;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::{EmitError, EvalError, EvalResult};
use crate::decider::Decider;
use crate::events::{self, NodeEvent, NodeEventKind, SettleStatus};

/// Marker bound for values a node can carry.
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Payload for T {}

/// A settled observation: `Ok(None)` is the vacant (null/absent) success.
pub(crate) type Settled<T> = Result<Option<T>, EvalError>;

/// The awaitable view of a node's result promise.
pub type Handle<T> = BoxFuture<'static, EvalResult<Option<T>>>;

/// Evaluation body: runs once, after the join barrier fires.
pub(crate) type Body<T> = Box<dyn FnOnce() -> BoxFuture<'static, Settled<T>> + Send + 'static>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

fn next_node_id() -> u64 {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// One-shot result cell: settles exactly once, wakes every waiter, and keeps
/// the settled value for synchronous peeks.
pub(crate) struct ResultCell<T> {
    slot: OnceLock<Settled<T>>,
    notify: Notify,
}

impl<T: Payload> ResultCell<T> {
    fn new() -> Self {
        ResultCell {
            slot: OnceLock::new(),
            notify: Notify::new(),
        }
    }

    fn pre_settled(value: Settled<T>) -> Self {
        let cell = Self::new();
        let _ = cell.slot.set(value);
        cell
    }

    /// Returns false if the cell was already settled.
    fn settle(&self, value: Settled<T>) -> bool {
        let fresh = self.slot.set(value).is_ok();
        if fresh {
            self.notify.notify_waiters();
        }
        fresh
    }

    fn peek(&self) -> Option<&Settled<T>> {
        self.slot.get()
    }

    async fn wait(&self) -> Settled<T> {
        loop {
            if let Some(settled) = self.slot.get() {
                return settled.clone();
            }
            let notified = self.notify.notified();
            // Re-check after registering so a settle between the first check
            // and registration cannot be missed.
            if let Some(settled) = self.slot.get() {
                return settled.clone();
            }
            notified.await;
        }
    }
}

/// Failure/vacancy policy of a single dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EdgeKind {
    /// Child failure propagates verbatim; a vacant child is a missing input.
    Required,
    /// Child failure propagates; a vacant child is data the body may observe.
    Tolerant,
    /// Child failure and vacancy are both absorbed.
    Shielded,
}

/// Summary of a child's settlement as seen over an edge.
#[derive(Debug, Clone)]
pub(crate) enum EdgeOutcome {
    Fulfilled,
    Vacant,
    Failed(EvalError),
}

/// A dependency edge participating in the join barrier.
pub(crate) struct JoinEdge {
    pub label: String,
    pub kind: EdgeKind,
    pub node: NodeRef,
}

/// Structural metadata describing one input edge, exposed for visualization.
#[derive(Clone)]
pub struct InputEdge {
    pub label: String,
    /// True when failures on this edge are absorbed rather than propagated.
    pub shielded: bool,
    pub node: NodeRef,
}

/// Structural metadata held by every node: its inputs by label and its sinks.
pub struct Structure {
    inputs: Vec<InputEdge>,
    sinks: Mutex<Vec<NodeRef>>,
}

impl Structure {
    fn new(inputs: Vec<InputEdge>, sinks: Vec<NodeRef>) -> Self {
        Structure {
            inputs,
            sinks: Mutex::new(sinks),
        }
    }

    pub fn inputs(&self) -> &[InputEdge] {
        &self.inputs
    }

    pub fn sinks(&self) -> Vec<NodeRef> {
        self.sinks.lock().expect("sink list lock").clone()
    }
}

/// Everything a node needs besides its result cell, consumed by the first
/// `apply()`.
struct Work<T: Payload> {
    join: Vec<JoinEdge>,
    prestart: Vec<NodeRef>,
    decider: Option<Decider>,
    body: Body<T>,
}

/// Constructor bundle for [`Node::from_parts`].
pub(crate) struct Parts<T: Payload> {
    pub name: String,
    pub key: Option<String>,
    pub optional: bool,
    pub can_emit_null: bool,
    pub join: Vec<JoinEdge>,
    /// Inputs that are not join dependencies (switch branches, lazy boolean
    /// operands); recorded for visualization only.
    pub extra_inputs: Vec<(String, NodeRef)>,
    pub prestart: Vec<NodeRef>,
    pub decider: Option<Decider>,
    pub sinks: Vec<NodeRef>,
    pub body: Body<T>,
}

impl<T: Payload> Parts<T> {
    pub fn new(name: impl Into<String>, body: Body<T>) -> Self {
        Parts {
            name: name.into(),
            key: None,
            optional: false,
            can_emit_null: false,
            join: Vec::new(),
            extra_inputs: Vec::new(),
            prestart: Vec::new(),
            decider: None,
            sinks: Vec::new(),
            body,
        }
    }
}

struct NodeInner<T: Payload> {
    id: u64,
    name: String,
    key: Option<String>,
    optional: bool,
    can_emit_null: bool,
    subgraph: OnceLock<Arc<str>>,
    applied: AtomicBool,
    cell: ResultCell<T>,
    work: Mutex<Option<Work<T>>>,
    structure: Structure,
}

impl<T: Payload> NodeInner<T> {
    fn display_name(&self) -> String {
        match &self.key {
            Some(key) => format!("{}:{}", self.name, key),
            None => self.name.clone(),
        }
    }

    fn publish(&self, kind: NodeEventKind) {
        events::publish(NodeEvent {
            node: self.display_name(),
            id: self.id,
            kind,
        });
    }

    fn outcome(&self) -> Option<EdgeOutcome> {
        self.cell.peek().map(|settled| match settled {
            Ok(Some(_)) => EdgeOutcome::Fulfilled,
            Ok(None) => EdgeOutcome::Vacant,
            Err(err) => EdgeOutcome::Failed(err.clone()),
        })
    }

    /// Elect a driver for this node and spawn its evaluation task. Idempotent;
    /// losers observe the same scheduled computation.
    fn ensure_driven(self: &Arc<Self>) {
        if self
            .applied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let work = self.work.lock().expect("node work lock").take();
        let Some(work) = work else {
            // Pre-settled nodes carry no work.
            return;
        };
        let inner = Arc::clone(self);
        let sink = events::current_sink();
        tokio::spawn(events::rescope(sink, drive(inner, work)));
    }

    fn finish(&self, settled: Settled<T>, elapsed: Duration, body: Option<Duration>) {
        let status = match &settled {
            Ok(Some(_)) => SettleStatus::Fulfilled,
            Ok(None) => SettleStatus::Vacant,
            Err(_) => SettleStatus::Failed,
        };
        if let Err(err) = &settled {
            metrics::counter!("weft.node.errors_total", "kind" => err.kind_label()).increment(1);
            debug!(node = %self.display_name(), error = %err, "node settled with failure");
        }
        metrics::counter!("weft.node.settled_total", "status" => status.label()).increment(1);
        metrics::histogram!("weft.node.latency_ms").record(elapsed.as_secs_f64() * 1_000.0);
        // Record the settlement before waking waiters, so anyone who observed
        // the promise also finds the event in the sink.
        self.publish(NodeEventKind::Settled {
            status,
            elapsed,
            body,
        });
        if !self.cell.settle(settled) {
            warn!(node = %self.display_name(), "node settled twice; keeping first result");
            return;
        }

        // Sinks are fire-and-forget: kicked after settlement on every path,
        // success or failure, and never awaited.
        let sinks = self.structure.sinks();
        if !sinks.is_empty() {
            for sink in &sinks {
                sink.inner.ensure_driven_erased();
            }
            self.publish(NodeEventKind::SinksKicked { count: sinks.len() });
        }
    }
}

async fn drive<T: Payload>(inner: Arc<NodeInner<T>>, work: Work<T>) {
    let started = Instant::now();
    inner.publish(NodeEventKind::Applied);
    debug!(node = %inner.display_name(), id = inner.id, "node applied");

    for node in &work.prestart {
        node.inner.ensure_driven_erased();
    }

    let waits: Vec<_> = work
        .join
        .iter()
        .map(|edge| edge.node.inner.wait_settled())
        .collect();
    let outcomes = join_all(waits).await;
    inner.publish(NodeEventKind::DepsJoined {
        waited: started.elapsed(),
    });

    let mut verdict: Option<EvalError> = None;
    for (edge, outcome) in work.join.iter().zip(outcomes) {
        match (edge.kind, outcome) {
            (EdgeKind::Shielded, _) => {}
            (_, EdgeOutcome::Failed(err)) => {
                verdict = Some(err);
                break;
            }
            (EdgeKind::Required, EdgeOutcome::Vacant) => {
                verdict = Some(EvalError::MissingInput {
                    node: inner.display_name(),
                    slot: edge.label.clone(),
                });
                break;
            }
            _ => {}
        }
    }

    let mut body_elapsed = None;
    let settled: Settled<T> = if let Some(err) = verdict {
        Err(err)
    } else if let Some(decider) = work.decider.as_ref().filter(|d| !d.allows()) {
        inner.publish(NodeEventKind::GatedOff {
            key: decider.key().to_string(),
        });
        debug!(node = %inner.display_name(), key = decider.key(), "node gated off");
        if inner.optional || inner.can_emit_null {
            Ok(None)
        } else {
            Err(EvalError::GatedOff {
                node: inner.display_name(),
                key: decider.key().to_string(),
            })
        }
    } else {
        inner.publish(NodeEventKind::BodyStarted);
        let body_started = Instant::now();
        let out = (work.body)().await;
        body_elapsed = Some(body_started.elapsed());
        match out {
            Ok(None) if !inner.can_emit_null => Err(EvalError::VacantResult {
                node: inner.display_name(),
            }),
            other => other,
        }
    };

    // Presence-wrapped handles never fail: every failure becomes absent.
    let settled = match settled {
        Err(err) if inner.optional => {
            debug!(node = %inner.display_name(), error = %err, "absorbed into absent");
            Ok(None)
        }
        other => other,
    };

    inner.finish(settled, started.elapsed(), body_elapsed);
}

/// Object-safe view of a node used for joins, sinks, and structure walks.
pub(crate) trait ErasedNode: Send + Sync {
    fn ensure_driven_erased(&self);
    fn wait_settled(&self) -> BoxFuture<'static, EdgeOutcome>;
    fn peek_outcome(&self) -> Option<EdgeOutcome>;
    fn cloned_value_any(&self) -> Option<Box<dyn Any + Send + Sync>>;
    fn node_name(&self) -> String;
    fn id(&self) -> u64;
    fn is_optional(&self) -> bool;
    fn structure(&self) -> &Structure;
    fn set_subgraph(&self, tag: Arc<str>);
    fn subgraph(&self) -> Option<Arc<str>>;
}

struct Erased<T: Payload>(Arc<NodeInner<T>>);

impl<T: Payload> ErasedNode for Erased<T> {
    fn ensure_driven_erased(&self) {
        self.0.ensure_driven();
    }

    fn wait_settled(&self) -> BoxFuture<'static, EdgeOutcome> {
        self.0.ensure_driven();
        let inner = Arc::clone(&self.0);
        Box::pin(async move {
            match inner.cell.wait().await {
                Ok(Some(_)) => EdgeOutcome::Fulfilled,
                Ok(None) => EdgeOutcome::Vacant,
                Err(err) => EdgeOutcome::Failed(err),
            }
        })
    }

    fn peek_outcome(&self) -> Option<EdgeOutcome> {
        self.0.outcome()
    }

    fn cloned_value_any(&self) -> Option<Box<dyn Any + Send + Sync>> {
        match self.0.cell.peek() {
            Some(Ok(Some(value))) => Some(Box::new(value.clone()) as Box<dyn Any + Send + Sync>),
            _ => None,
        }
    }

    fn node_name(&self) -> String {
        self.0.display_name()
    }

    fn id(&self) -> u64 {
        self.0.id
    }

    fn is_optional(&self) -> bool {
        self.0.optional
    }

    fn structure(&self) -> &Structure {
        &self.0.structure
    }

    fn set_subgraph(&self, tag: Arc<str>) {
        let _ = self.0.subgraph.set(tag);
    }

    fn subgraph(&self) -> Option<Arc<str>> {
        self.0.subgraph.get().cloned()
    }
}

/// A type-erased node handle. Carries identity and structure but no value
/// type; used for sinks, subgraph exposure, and visualization walks.
#[derive(Clone)]
pub struct NodeRef {
    inner: Arc<dyn ErasedNode>,
}

impl NodeRef {
    pub fn name(&self) -> String {
        self.inner.node_name()
    }

    /// Process-unique node id, stable for the node's lifetime.
    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    pub fn is_optional(&self) -> bool {
        self.inner.is_optional()
    }

    pub fn structure(&self) -> &Structure {
        self.inner.structure()
    }

    /// The enclosing subgraph's name, when this node is an exposed output.
    pub fn subgraph(&self) -> Option<Arc<str>> {
        self.inner.subgraph()
    }

    /// Tag this node as an exposed output of the named subgraph. Metadata
    /// only; evaluation is unaffected. The first tag wins.
    pub fn set_subgraph(&self, tag: Arc<str>) {
        self.inner.set_subgraph(tag);
    }

    /// Kick off evaluation without retaining a typed handle.
    pub fn start(&self) {
        self.inner.ensure_driven_erased();
    }

    pub(crate) fn wait_settled(&self) -> BoxFuture<'static, EdgeOutcome> {
        self.inner.wait_settled()
    }

    pub(crate) fn cloned_value_any(&self) -> Option<Box<dyn Any + Send + Sync>> {
        self.inner.cloned_value_any()
    }
}

/// A handle to a single, lazily and at-most-once computed value.
///
/// Handles are cheap to clone and share one result promise: every consumer of
/// the same node observes the same settlement.
pub struct Node<T: Payload> {
    inner: Arc<NodeInner<T>>,
}

impl<T: Payload> Clone for Node<T> {
    fn clone(&self) -> Self {
        Node {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Payload> std::fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("name", &self.inner.display_name())
            .finish()
    }
}

impl<T: Payload> Node<T> {
    pub(crate) fn from_parts(parts: Parts<T>) -> Node<T> {
        let mut inputs: Vec<InputEdge> = parts
            .join
            .iter()
            .map(|edge| InputEdge {
                label: edge.label.clone(),
                shielded: edge.kind == EdgeKind::Shielded,
                node: edge.node.clone(),
            })
            .collect();
        inputs.extend(parts.extra_inputs.into_iter().map(|(label, node)| InputEdge {
            label,
            shielded: false,
            node,
        }));

        Node {
            inner: Arc::new(NodeInner {
                id: next_node_id(),
                name: parts.name,
                key: parts.key,
                optional: parts.optional,
                can_emit_null: parts.can_emit_null,
                subgraph: OnceLock::new(),
                applied: AtomicBool::new(false),
                cell: ResultCell::new(),
                work: Mutex::new(Some(Work {
                    join: parts.join,
                    prestart: parts.prestart,
                    decider: parts.decider,
                    body: parts.body,
                })),
                structure: Structure::new(inputs, parts.sinks),
            }),
        }
    }

    /// A node whose promise is settled at construction.
    pub(crate) fn from_settled(
        name: impl Into<String>,
        optional: bool,
        settled: Settled<T>,
    ) -> Node<T> {
        Node {
            inner: Arc::new(NodeInner {
                id: next_node_id(),
                name: name.into(),
                key: None,
                optional,
                can_emit_null: true,
                subgraph: OnceLock::new(),
                applied: AtomicBool::new(true),
                cell: ResultCell::pre_settled(settled),
                work: Mutex::new(None),
                structure: Structure::new(Vec::new(), Vec::new()),
            }),
        }
    }

    /// Initiate (or join) the computation and return the result handle.
    ///
    /// The first call schedules dependency evaluation bottom-up; every call
    /// returns a handle over the same one-shot promise. Must be called inside
    /// a tokio runtime.
    pub fn apply(&self) -> Handle<T> {
        self.inner.ensure_driven();
        let inner = Arc::clone(&self.inner);
        Box::pin(async move { inner.cell.wait().await })
    }

    /// Read the settled value. `Ok(None)` is a vacant success; reading a
    /// pending or failed node is a programmer error reported to the caller.
    pub fn emit(&self) -> Result<Option<T>, EmitError> {
        match self.inner.cell.peek() {
            None => Err(EmitError::Pending {
                node: self.inner.display_name(),
            }),
            Some(Err(err)) => Err(EmitError::Failed {
                node: self.inner.display_name(),
                source: err.clone(),
            }),
            Some(Ok(value)) => Ok(value.clone()),
        }
    }

    /// A handle that always succeeds: failures and vacant results map to
    /// `None`, success to `Some(value)`.
    pub fn to_safe_future(&self) -> BoxFuture<'static, Option<T>> {
        let shielded = Node::optional(self.clone());
        Box::pin(async move { shielded.apply().await.ok().flatten() })
    }

    /// Display name, including the instance key when one is set.
    pub fn name(&self) -> String {
        self.inner.display_name()
    }

    pub fn key(&self) -> Option<&str> {
        self.inner.key.as_deref()
    }

    /// True for presence-wrapped handles, whose failures read as absent.
    pub fn is_optional(&self) -> bool {
        self.inner.optional
    }

    /// True when a vacant body result is a legal settlement.
    pub fn is_null_admissible(&self) -> bool {
        self.inner.can_emit_null
    }

    /// Erase the value type, keeping identity and structure.
    pub fn to_ref(&self) -> NodeRef {
        NodeRef {
            inner: Arc::new(Erased(Arc::clone(&self.inner))),
        }
    }

    /// Attach sinks to be kicked off once this node settles. Sinks attached
    /// after settlement are not retroactively started.
    pub fn attach_sinks(&self, sinks: impl IntoIterator<Item = NodeRef>) {
        let mut held = self
            .inner
            .structure
            .sinks
            .lock()
            .expect("sink list lock");
        held.extend(sinks);
    }

    /// Wrap a node so that it always succeeds: failure and vacancy of the
    /// underlying node both read as absent (`Ok(None)`).
    pub fn optional(node: Node<T>) -> Node<T> {
        if node.is_optional() {
            return node;
        }
        let child = node.clone();
        let mut parts = Parts::new(
            format!("~{}", node.name()),
            Box::new(move || {
                let settled = child.settled_value();
                Box::pin(std::future::ready(settled))
            }),
        );
        parts.optional = true;
        parts.can_emit_null = true;
        // Shielded edge: the child's failure reaches the body as a settled
        // error, which the optional rescue then turns into absent.
        parts.join = vec![JoinEdge {
            label: "wrapped".into(),
            kind: EdgeKind::Shielded,
            node: node.to_ref(),
        }];
        Node::from_parts(parts)
    }

    /// Read the settled value from inside a body, after the join barrier.
    pub(crate) fn settled_value(&self) -> Settled<T> {
        match self.inner.cell.peek() {
            Some(settled) => settled.clone(),
            None => Err(EvalError::Evaluate {
                node: self.inner.display_name(),
                message: "dependency read before settlement".into(),
            }),
        }
    }

    /// Like [`settled_value`], but vacancy is an error naming `slot`.
    pub(crate) fn settled_required(&self, slot: &str) -> EvalResult<T> {
        match self.settled_value()? {
            Some(value) => Ok(value),
            None => Err(EvalError::MissingInput {
                node: self.inner.display_name(),
                slot: slot.to_string(),
            }),
        }
    }
}

/// The shared absent sentinel bound to every unfilled optional slot. A single
/// erased node, settled vacant from the start.
pub(crate) fn absent_sentinel() -> NodeRef {
    static SENTINEL: Lazy<NodeRef> = Lazy::new(|| {
        let node: Node<()> = Node::from_settled("ABSENT", true, Ok(None));
        node.to_ref()
    });
    SENTINEL.clone()
}
