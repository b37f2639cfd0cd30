use std::sync::Arc;

use thiserror::Error;

/// Convenient result alias for node evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

/// Canonical error type carried by a node's result promise.
///
/// Failures flow through required edges without transformation, so the type is
/// cheap to clone and comparable: a dependent node settles with the *same*
/// error its failed dependency produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Generic error raised by user code (bodies, transforms, services).
    #[error("{0}")]
    Message(Arc<str>),
    /// A node body raised; the message is wrapped with the node's name.
    #[error("node `{node}` evaluation failed: {message}")]
    Evaluate { node: String, message: String },
    /// A required input settled successfully but carried no value.
    #[error("required input `{slot}` of node `{node}` produced no value")]
    MissingInput { node: String, slot: String },
    /// The body yielded a vacant result on a node that does not admit one.
    #[error("node `{node}` produced no value but is not null-admissible")]
    VacantResult { node: String },
    /// The node's decider suppressed execution and no vacant fallback applies.
    #[error("node `{node}` was switched off by decider `{key}`")]
    GatedOff { node: String, key: String },
}

impl EvalError {
    /// Construct a generic error from displayable content.
    pub fn new(message: impl Into<String>) -> Self {
        let message: String = message.into();
        EvalError::Message(message.into())
    }

    /// Short stable label used for metrics and event sinks.
    pub fn kind_label(&self) -> &'static str {
        match self {
            EvalError::Message(_) => "user",
            EvalError::Evaluate { .. } => "evaluate",
            EvalError::MissingInput { .. } => "missing_input",
            EvalError::VacantResult { .. } => "vacant_result",
            EvalError::GatedOff { .. } => "gated_off",
        }
    }
}

impl From<anyhow::Error> for EvalError {
    fn from(err: anyhow::Error) -> Self {
        EvalError::new(err.to_string())
    }
}

/// Errors raised synchronously while assembling a node or subgraph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// Binding names a slot the node kind does not declare.
    #[error("slot `{slot}` is not declared by node kind `{kind}`")]
    UnknownSlot { kind: String, slot: String },
    /// The same slot was bound twice.
    #[error("slot `{slot}` is already bound on node kind `{kind}`")]
    DuplicateSlot { kind: String, slot: String },
    /// One or more required slots were left unbound.
    #[error("required slots not bound for node `{kind}`: {slots:?}")]
    MissingSlots { kind: String, slots: Vec<String> },
    /// More dependencies than the anonymous slot set can hold.
    #[error("node `{name}` accepts at most {limit} dependencies, got {supplied}")]
    TooManyDependencies {
        name: String,
        limit: usize,
        supplied: usize,
    },
    /// Boolean combinators are only defined over two or more operands.
    #[error("boolean combinators need at least two operands, got {supplied}")]
    BooleanArity { supplied: usize },
    /// A subgraph asked to mark exposure without exposing anything.
    #[error("subgraph `{subgraph}` exposes no nodes")]
    NoExposedNodes { subgraph: String },
}

/// Programmer errors raised when reading a node value out of band.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    /// The node has not settled. Usually the node was never wired in as a
    /// dependency of the graph being evaluated.
    #[error("node `{node}` has not settled yet; was it applied as a dependency?")]
    Pending { node: String },
    /// The node settled with a failure.
    #[error("node `{node}` settled with a failure: {source}")]
    Failed {
        node: String,
        #[source]
        source: EvalError,
    },
}
