//! Lifecycle events and the pluggable debug sink.
//!
//! The engine narrates every node's lifecycle twice: once to `tracing` at
//! debug/trace level, and once to the [`EventSink`] installed in task-local
//! scope, if any. Sinks are a debugging aid; the engine never blocks on them
//! and swallows nothing into them that affects evaluation.

use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Verbosity threshold honoured by sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugLevel {
    Off,
    Basic,
    Detailed,
    Verbose,
}

/// How a node's promise settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStatus {
    Fulfilled,
    Vacant,
    Failed,
}

impl SettleStatus {
    pub fn label(self) -> &'static str {
        match self {
            SettleStatus::Fulfilled => "fulfilled",
            SettleStatus::Vacant => "vacant",
            SettleStatus::Failed => "failed",
        }
    }
}

/// A single lifecycle observation for one node.
#[derive(Debug, Clone)]
pub struct NodeEvent {
    pub node: String,
    pub id: u64,
    pub kind: NodeEventKind,
}

#[derive(Debug, Clone)]
pub enum NodeEventKind {
    /// First `apply()` observed; dependency evaluation scheduled.
    Applied,
    /// All declared dependency edges have settled.
    DepsJoined { waited: Duration },
    /// The decider suppressed the body.
    GatedOff { key: String },
    /// The body started running.
    BodyStarted,
    /// The result promise settled.
    Settled {
        status: SettleStatus,
        elapsed: Duration,
        body: Option<Duration>,
    },
    /// Sinks were kicked off after settlement.
    SinksKicked { count: usize },
}

impl NodeEventKind {
    /// Minimum sink level at which this event is delivered.
    fn level(&self) -> DebugLevel {
        match self {
            NodeEventKind::Settled { .. } => DebugLevel::Basic,
            NodeEventKind::SinksKicked { .. } => DebugLevel::Verbose,
            _ => DebugLevel::Detailed,
        }
    }
}

/// Receives lifecycle events for the task tree it is scoped over.
pub trait EventSink: Send + Sync {
    /// Verbosity this sink wants; events below it are not delivered.
    fn level(&self) -> DebugLevel {
        DebugLevel::Detailed
    }

    fn record(&self, event: &NodeEvent);
}

tokio::task_local! {
    static CURRENT_SINK: Arc<dyn EventSink>;
}

/// Run a future with `sink` installed as the scoped debug sink. Node tasks
/// spawned while the scope is active inherit the sink.
pub async fn with_sink<F>(sink: Arc<dyn EventSink>, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_SINK.scope(sink, fut).await
}

/// Snapshot the scoped sink, if any. Used when spawning node tasks so the
/// scope flows through the continuation.
pub(crate) fn current_sink() -> Option<Arc<dyn EventSink>> {
    CURRENT_SINK.try_with(Arc::clone).ok()
}

/// Re-install a previously captured sink around a spawned task body.
pub(crate) async fn rescope<F>(sink: Option<Arc<dyn EventSink>>, fut: F) -> F::Output
where
    F: Future,
{
    match sink {
        Some(sink) => CURRENT_SINK.scope(sink, fut).await,
        None => fut.await,
    }
}

/// Deliver an event to the scoped sink, honouring its level.
pub(crate) fn publish(event: NodeEvent) {
    let _ = CURRENT_SINK.try_with(|sink| {
        if sink.level() >= event.kind.level() {
            sink.record(&event);
        }
    });
}

/// A sink that collects formatted one-line messages. Handy in tests and demos.
pub struct MessageSink {
    level: DebugLevel,
    lines: Mutex<Vec<String>>,
}

impl MessageSink {
    pub fn new(level: DebugLevel) -> Self {
        MessageSink {
            level,
            lines: Mutex::new(Vec::new()),
        }
    }

    /// Copy out everything recorded so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("message sink lock").clone()
    }
}

impl EventSink for MessageSink {
    fn level(&self) -> DebugLevel {
        self.level
    }

    fn record(&self, event: &NodeEvent) {
        let line = match &event.kind {
            NodeEventKind::Applied => format!("NODE[{}]: applied", event.node),
            NodeEventKind::DepsJoined { waited } => {
                format!("NODE[{}]: dependencies joined ({waited:?})", event.node)
            }
            NodeEventKind::GatedOff { key } => {
                format!("NODE[{}]: switched off by decider `{key}`", event.node)
            }
            NodeEventKind::BodyStarted => format!("NODE[{}]: running", event.node),
            NodeEventKind::Settled {
                status,
                elapsed,
                body,
            } => format!(
                "NODE[{}]: settled {} ({elapsed:?} total, {body:?} body)",
                event.node,
                status.label()
            ),
            NodeEventKind::SinksKicked { count } => {
                format!("NODE[{}]: kicked {count} sink(s)", event.node)
            }
        };
        self.lines.lock().expect("message sink lock").push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_scope_filters_by_level() {
        let sink = Arc::new(MessageSink::new(DebugLevel::Basic));
        let scoped = sink.clone();
        with_sink(scoped, async {
            publish(NodeEvent {
                node: "a".into(),
                id: 1,
                kind: NodeEventKind::Applied,
            });
            publish(NodeEvent {
                node: "a".into(),
                id: 1,
                kind: NodeEventKind::Settled {
                    status: SettleStatus::Fulfilled,
                    elapsed: Duration::from_millis(1),
                    body: None,
                },
            });
        })
        .await;

        let lines = sink.lines();
        assert_eq!(lines.len(), 1, "basic level only records settlement");
        assert!(lines[0].contains("settled fulfilled"));
    }

    #[tokio::test]
    async fn no_scope_means_no_delivery() {
        // Must not panic outside any scope.
        publish(NodeEvent {
            node: "b".into(),
            id: 2,
            kind: NodeEventKind::BodyStarted,
        });
    }
}
