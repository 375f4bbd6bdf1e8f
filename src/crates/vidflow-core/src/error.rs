//! Error types for compilation and execution.
//!
//! Each phase has its own error enum; [`PipelineError`] is the umbrella the
//! convenience entry points return. Compile-time errors surface
//! synchronously from [`compile`](crate::compile::compile); runtime faults
//! inside a running graph are delivered as
//! [`RuntimeEvent`](crate::runtime::RuntimeEvent)s instead, and only
//! startup failures abort [`Runtime::run`](crate::runtime::Runtime::run).

use thiserror::Error;
use vidflow_lang::{FrontendError, LexError, ParseError};

/// Errors raised while lowering a program into an execution graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A call does not match any registered function or defined pipeline.
    #[error("unknown function or pipeline '{name}'")]
    UnknownName { name: String },

    /// Pipeline definitions reference each other in a cycle.
    #[error("pipeline definitions form a cycle through '{name}'")]
    Cycle { name: String },

    /// A node's kind does not fit its position in the graph, e.g. a sink
    /// used mid-pipeline or a processor whose output is never consumed.
    #[error("'{node}': {detail}")]
    KindMismatch { node: String, detail: String },

    /// A parallel block has no downstream consumer to merge into.
    #[error("parallel block has no downstream consumer")]
    DanglingParallel,

    /// The program contains no source node (or nothing to run at all).
    #[error("pipeline has no source")]
    NoSource,

    /// The program contains no sink node.
    #[error("pipeline has no sink")]
    NoSink,
}

/// Errors a transform reports back to the runtime.
///
/// Transforms are opaque to the core; all that crosses the boundary is a
/// message. The worker's failure policy (isolate and continue, fatal after
/// a threshold) is applied on top.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for TransformError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for TransformError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Fatal runtime errors, surfaced before or instead of a run report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// A source could not start producing; the run was never started.
    #[error("source '{node}' failed to start: {reason}")]
    SourceStartup { node: String, reason: String },

    /// The graph references a function the supplied registry does not have.
    /// Compiling and running against the same registry rules this out.
    #[error("function '{name}' is not registered")]
    UnregisteredFunction { name: String },
}

/// Umbrella error for the source-to-running-pipeline path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl From<FrontendError> for PipelineError {
    fn from(err: FrontendError) -> Self {
        match err {
            FrontendError::Lex(err) => PipelineError::Lex(err),
            FrontendError::Parse(err) => PipelineError::Parse(err),
        }
    }
}

/// Convenience result type using [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;
