//! The supervisor: spawns workers, wires channels, manages timed
//! segments, and coordinates shutdown.
//!
//! Given a compiled [`Graph`], [`Runtime::run`] executes it:
//!
//! 1. **Preflight.** Every source transform's `start()` is probed; a
//!    failure aborts before anything is spawned
//!    ([`RuntimeError::SourceStartup`]).
//! 2. **Wiring.** One bounded [`Channel`] per edge, at the edge's
//!    capacity.
//! 3. **Stages.** The graph's weakly-connected components run in order:
//!    all of a stage's workers are spawned, its segment timers armed, and
//!    the next stage only starts after the previous one has fully drained.
//!    This is what makes `A @ 3s -> B @ 5s` a timed sequence.
//! 4. **Timed segments.** When a segment's deadline fires, the supervisor
//!    closes the output edges of that segment's sources; end-of-stream
//!    then cascades downstream and the stage drains on its own.
//! 5. **Shutdown.** External cancellation stops sources at their next
//!    operation; consumers drain to end-of-stream. The supervisor joins
//!    every worker, aborting stragglers after the configured grace
//!    period.
//!
//! The run's outcome is a [`RunReport`] whose [`RunStatus`] distinguishes
//! normal completion, cancellation, and pipeline-terminating faults.
//! Faults inside transforms never abort `run` itself; they arrive on the
//! event stream and are summarized in the final status.

mod cancel;
mod config;
mod events;
mod worker;

pub use cancel::Cancellation;
pub use config::RuntimeConfig;
pub use events::RuntimeEvent;
pub use worker::WorkerState;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::error::RuntimeError;
use crate::graph::{Graph, NodeId};
use crate::registry::{FunctionKind, FunctionRegistry, Transform};

use events::{emit, now_ms, EventTx};
use worker::{Worker, WorkerOutcome};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every terminal stage completed and drained.
    Completed,
    /// The cancellation signal was observed; clean termination.
    Cancelled,
    /// A pipeline-terminating fault occurred.
    Failed { reason: String },
}

/// Summary returned by [`Runtime::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    /// Total frames accepted by sink transforms.
    pub frames_delivered: u64,
    /// Milliseconds since the Unix epoch.
    pub started_at: i64,
    pub finished_at: i64,
}

/// Owns a graph for the duration of one run.
pub struct Runtime {
    graph: Graph,
    registry: Arc<FunctionRegistry>,
    config: RuntimeConfig,
    cancel: Cancellation,
    events_tx: EventTx,
    events_rx: Option<UnboundedReceiver<RuntimeEvent>>,
}

impl Runtime {
    pub fn new(graph: Graph, registry: Arc<FunctionRegistry>, config: RuntimeConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            graph,
            registry,
            config,
            cancel: Cancellation::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// The shared cancellation signal. The host keeps a clone and trips it
    /// to stop the run (user interrupt, window closed, ...).
    pub fn cancellation(&self) -> Cancellation {
        self.cancel.clone()
    }

    /// Uses an externally owned cancellation signal instead of the
    /// internally created one.
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Takes the event stream receiver. Yields `None` after the first
    /// call; events with no receiver are discarded.
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<RuntimeEvent>> {
        self.events_rx.take()
    }

    /// Executes the graph to completion, cancellation, or failure.
    pub async fn run(self) -> Result<RunReport, RuntimeError> {
        let started_at = now_ms();

        // Resolve every node's transform up front; the graph was compiled
        // against a registry, so a miss here means the caller swapped it.
        let mut transforms: Vec<Arc<dyn Transform>> = Vec::with_capacity(self.graph.nodes.len());
        for node in &self.graph.nodes {
            let spec =
                self.registry
                    .get(&node.name)
                    .ok_or_else(|| RuntimeError::UnregisteredFunction {
                        name: node.name.clone(),
                    })?;
            transforms.push(spec.transform.clone());
        }

        // Fatal-at-startup: probe sources before any worker exists.
        for node in self.graph.sources() {
            transforms[node.id.index()]
                .start(&node.params)
                .map_err(|err| RuntimeError::SourceStartup {
                    node: node.name.clone(),
                    reason: err.message,
                })?;
        }

        info!(
            nodes = self.graph.nodes.len(),
            edges = self.graph.edges.len(),
            stages = self.graph.stages.len(),
            "pipeline starting"
        );
        emit(&self.events_tx, RuntimeEvent::RunStarted { timestamp: started_at });

        let channels: Vec<Channel> = self
            .graph
            .edges
            .iter()
            .map(|edge| Channel::new(edge.capacity))
            .collect();

        let grace = self.config.shutdown_grace();
        let mut frames_delivered = 0u64;
        let mut fault_reason: Option<String> = None;

        for (stage_index, stage) in self.graph.stages.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            debug!(stage = stage_index, nodes = stage.len(), "stage starting");
            emit(
                &self.events_tx,
                RuntimeEvent::StageStarted {
                    stage: stage_index,
                    timestamp: now_ms(),
                },
            );

            let timers = self.arm_segment_timers(stage, &channels);

            let handles: Vec<JoinHandle<WorkerOutcome>> = stage
                .iter()
                .map(|&node_id| {
                    let node = self.graph.node(node_id);
                    let worker = Worker {
                        node: node_id,
                        name: node.name.clone(),
                        kind: node.kind,
                        params: node.params.clone(),
                        transform: transforms[node_id.index()].clone(),
                        inputs: node
                            .inputs
                            .iter()
                            .map(|edge| channels[edge.index()].clone())
                            .collect(),
                        outputs: node
                            .outputs
                            .iter()
                            .map(|edge| channels[edge.index()].clone())
                            .collect(),
                        cancel: self.cancel.clone(),
                        events: self.events_tx.clone(),
                        source_interval: self.config.source_interval(),
                        failure_limit: self.config.consecutive_failure_limit,
                    };
                    tokio::spawn(worker.run())
                })
                .collect();

            self.join_stage(handles, grace, &mut frames_delivered, &mut fault_reason)
                .await;

            for timer in timers {
                timer.abort();
            }
        }

        let finished_at = now_ms();
        let status = if self.cancel.is_cancelled() {
            emit(
                &self.events_tx,
                RuntimeEvent::RunCancelled {
                    timestamp: finished_at,
                },
            );
            RunStatus::Cancelled
        } else if let Some(reason) = fault_reason {
            RunStatus::Failed { reason }
        } else {
            RunStatus::Completed
        };
        info!(?status, frames_delivered, "pipeline finished");
        emit(
            &self.events_tx,
            RuntimeEvent::RunCompleted {
                status: status.clone(),
                timestamp: finished_at,
            },
        );

        Ok(RunReport {
            status,
            frames_delivered,
            started_at,
            finished_at,
        })
    }

    /// One timer task per deadline segment rooted in this stage. When the
    /// deadline fires, the segment's source output edges close; downstream
    /// drains via end-of-stream.
    fn arm_segment_timers(
        &self,
        stage: &[NodeId],
        channels: &[Channel],
    ) -> Vec<JoinHandle<()>> {
        let mut timers = Vec::new();
        for segment in &self.graph.segments {
            let Some(deadline) = segment.deadline else {
                continue;
            };
            let in_stage = segment
                .members
                .first()
                .map(|first| stage.contains(first))
                .unwrap_or(false);
            if !in_stage {
                continue;
            }

            let to_close: Vec<Channel> = segment
                .members
                .iter()
                .map(|&id| self.graph.node(id))
                .filter(|node| node.kind == FunctionKind::Source)
                .flat_map(|node| node.outputs.iter())
                .map(|edge| channels[edge.index()].clone())
                .collect();
            if to_close.is_empty() {
                debug!(segment = %segment.id, "deadline segment has no sources to close");
            }

            let segment_id = segment.id;
            let cancel = self.cancel.clone();
            let events = self.events_tx.clone();
            timers.push(tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(deadline) => {
                        info!(segment = %segment_id, "segment deadline reached, closing its sources");
                        emit(
                            &events,
                            RuntimeEvent::SegmentDeadline {
                                segment: segment_id,
                                timestamp: now_ms(),
                            },
                        );
                        for channel in &to_close {
                            channel.close();
                        }
                    }
                    _ = cancel.cancelled() => {}
                }
            }));
        }
        timers
    }

    /// Joins all workers of a stage. After cancellation is observed, the
    /// remaining workers get one shared grace window before being aborted.
    async fn join_stage(
        &self,
        handles: Vec<JoinHandle<WorkerOutcome>>,
        grace: Duration,
        frames_delivered: &mut u64,
        fault_reason: &mut Option<String>,
    ) {
        let mut abort_at: Option<Instant> = None;
        for mut handle in handles {
            let joined = loop {
                if let Some(deadline) = abort_at {
                    match tokio::time::timeout_at(deadline, &mut handle).await {
                        Ok(joined) => break joined,
                        Err(_) => {
                            warn!("worker exceeded shutdown grace period, aborting");
                            handle.abort();
                            break handle.await;
                        }
                    }
                }
                tokio::select! {
                    joined = &mut handle => break joined,
                    _ = self.cancel.cancelled() => {
                        abort_at = Some(Instant::now() + grace);
                    }
                }
            };

            match joined {
                Ok(outcome) => {
                    if outcome.kind == FunctionKind::Sink {
                        *frames_delivered += outcome.frames_in;
                    }
                    if outcome.faulted && fault_reason.is_none() {
                        *fault_reason = Some(format!(
                            "worker {} ({}) exceeded the consecutive failure limit",
                            outcome.node,
                            self.graph.node(outcome.node).name
                        ));
                    }
                }
                Err(join_err) => {
                    if join_err.is_panic() {
                        warn!(error = %join_err, "worker panicked");
                        if fault_reason.is_none() {
                            *fault_reason = Some("worker panicked".to_string());
                        }
                    }
                    // Aborted workers already counted as cancelled.
                }
            }
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.graph.nodes.len())
            .field("edges", &self.graph.edges.len())
            .field("config", &self.config)
            .finish()
    }
}
