//! # vidflow-core - Streaming Dataflow Runtime
//!
//! The execution half of vidflow: a compiler that lowers parsed pipeline
//! programs into graphs of nodes and bounded edges, and a tokio-based
//! runtime that turns those graphs into live workers exchanging frames
//! under backpressure.
//!
//! ## Architecture
//!
//! ```text
//!  source text ──► vidflow-lang ──► Program (syntax tree)
//!                                      │
//!                                      ▼  compile()
//!                    ┌──────────────────────────────────┐
//!                    │ Graph                            │
//!                    │  nodes · edges · segments · stages│
//!                    └────────────────┬─────────────────┘
//!                                     ▼  Runtime::run()
//!        ┌───────────┐   Channel   ┌───────────┐   Channel   ┌──────────┐
//!        │ source    │ ══════════► │ processor │ ══════════► │ sink     │
//!        │ worker    │  (bounded)  │ worker    │  (bounded)  │ worker   │
//!        └───────────┘             └───────────┘             └──────────┘
//!              ▲                  supervisor: segment timers,
//!              └─────────────────  cancellation, stage order
//! ```
//!
//! Each node runs as one worker task. Channels are bounded FIFO queues: a
//! fast producer blocks once its queue fills, which is the only flow
//! control in the system — no frame is ever silently dropped. Fan-out
//! broadcasts cheap frame clones to every branch; fan-in merges branches
//! in arrival order. `@`-bounded segments get a supervisor timer that
//! closes the segment's sources at the deadline, letting the rest of the
//! stage drain naturally.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use vidflow_core::{compile_source, Runtime, RuntimeConfig, RunStatus};
//! use vidflow_core::registry::{FunctionRegistry, FunctionSpec};
//! use vidflow_core::testing;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = FunctionRegistry::new();
//! registry.register("frames", FunctionSpec::source(testing::counter_source()));
//! registry.register(
//!     "double",
//!     FunctionSpec::processor(testing::scale_processor()).with_default("factor", json!(2)),
//! );
//! let (sink, recorded) = testing::recording_sink();
//! registry.register("record", FunctionSpec::sink(sink));
//!
//! let graph = compile_source(
//!     "frames with (limit: 3) -> double -> record",
//!     &registry,
//! )?;
//! let config = RuntimeConfig::default().with_source_interval(std::time::Duration::ZERO);
//! let report = Runtime::new(graph, Arc::new(registry), config).run().await?;
//!
//! assert_eq!(report.status, RunStatus::Completed);
//! assert_eq!(recorded.values(), vec![0, 2, 4]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`compile`] - syntax tree → [`Graph`] lowering and validation
//! - [`graph`] - the arena-style execution graph
//! - [`channel`] - bounded FIFO channels with close semantics
//! - [`registry`] - name → transform/kind/defaults lookup
//! - [`frame`] - the cheaply-clonable frame value
//! - [`runtime`] - supervisor, workers, events, cancellation
//! - [`testing`] - synthetic transforms for tests

pub mod channel;
pub mod compile;
pub mod error;
pub mod frame;
pub mod graph;
pub mod registry;
pub mod runtime;
pub mod testing;

pub use channel::{Channel, PushOutcome, Recv};
pub use compile::{compile, compile_with_options, CompileOptions};
pub use error::{CompileError, PipelineError, Result, RuntimeError, TransformError};
pub use frame::{Frame, FrameBuffer};
pub use graph::{Edge, EdgeId, Graph, Node, NodeId, Segment, SegmentId};
pub use registry::{FunctionKind, FunctionRegistry, FunctionSpec, Params, Transform};
pub use runtime::{
    Cancellation, RunReport, RunStatus, Runtime, RuntimeConfig, RuntimeEvent, WorkerState,
};

/// Parses and compiles a pipeline source string in one step.
pub fn compile_source(
    source: &str,
    registry: &FunctionRegistry,
) -> Result<Graph> {
    let program = vidflow_lang::parse(source)?;
    let graph = compile::compile(&program, registry)?;
    Ok(graph)
}
