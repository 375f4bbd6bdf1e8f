//! Per-node worker loops.
//!
//! Every graph node runs as one tokio task. A worker moves through
//! `Starting → Running → Draining → Stopped`, with `Faulted` reachable
//! from any state when the consecutive-failure limit is hit:
//!
//! - a **source** produces frames in a paced loop and broadcasts them to
//!   its output edges under backpressure;
//! - a **processor** merges its input edges in arrival order, applies its
//!   transform and broadcasts the result;
//! - a **sink** merges and applies for side effects only.
//!
//! On cancellation a source stops producing and closes its outputs;
//! consumers switch to draining and keep popping until end-of-stream, so
//! shutdown alone never discards a buffered frame.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::channel::{Channel, Recv};
use crate::frame::Frame;
use crate::graph::NodeId;
use crate::registry::{FunctionKind, Params, Transform};

use super::cancel::Cancellation;
use super::events::{emit, now_ms, EventTx};
use super::RuntimeEvent;

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Draining,
    Faulted,
    Stopped,
}

/// What a worker reports back to the supervisor when it stops.
#[derive(Debug)]
pub(crate) struct WorkerOutcome {
    pub node: NodeId,
    pub kind: FunctionKind,
    pub frames_in: u64,
    pub frames_out: u64,
    pub faulted: bool,
}

pub(crate) struct Worker {
    pub node: NodeId,
    pub name: String,
    pub kind: FunctionKind,
    pub params: Params,
    pub transform: Arc<dyn Transform>,
    pub inputs: Vec<Channel>,
    pub outputs: Vec<Channel>,
    pub cancel: Cancellation,
    pub events: EventTx,
    pub source_interval: Duration,
    pub failure_limit: u32,
}

impl Worker {
    pub async fn run(self) -> WorkerOutcome {
        let state = WorkerState::Starting;
        debug!(node = %self.node, name = %self.name, kind = %self.kind, ?state, "worker starting");
        emit(
            &self.events,
            RuntimeEvent::WorkerStarted {
                node: self.node,
                name: self.name.clone(),
                timestamp: now_ms(),
            },
        );

        let (frames_in, frames_out, faulted) = match self.kind {
            FunctionKind::Source => self.run_source().await,
            FunctionKind::Processor | FunctionKind::Sink => self.run_consumer().await,
        };

        let state = if faulted {
            WorkerState::Faulted
        } else {
            WorkerState::Stopped
        };
        debug!(
            node = %self.node,
            name = %self.name,
            frames_in,
            frames_out,
            ?state,
            "worker stopped"
        );
        emit(
            &self.events,
            RuntimeEvent::WorkerStopped {
                node: self.node,
                name: self.name.clone(),
                frames_in,
                frames_out,
                timestamp: now_ms(),
            },
        );
        WorkerOutcome {
            node: self.node,
            kind: self.kind,
            frames_in,
            frames_out,
            faulted,
        }
    }

    async fn run_source(&self) -> (u64, u64, bool) {
        let mut produced = 0u64;
        let mut consecutive = 0u32;
        let mut faulted = false;
        let mut next_frame = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                debug!(node = %self.node, "source cancelled");
                break;
            }
            if self.source_interval > Duration::ZERO {
                tokio::select! {
                    _ = tokio::time::sleep_until(next_frame) => {}
                    _ = self.cancel.cancelled() => break,
                }
            }
            match self.transform.apply(None, &self.params) {
                Ok(Some(mut frame)) => {
                    consecutive = 0;
                    frame.seq = produced;
                    if !self.broadcast(frame).await {
                        debug!(node = %self.node, "source outputs closed");
                        break;
                    }
                    produced += 1;
                    next_frame = Instant::now() + self.source_interval;
                }
                Ok(None) => {
                    debug!(node = %self.node, "source exhausted its stream");
                    break;
                }
                Err(err) => {
                    if self.record_fault(None, &err.message, &mut consecutive) {
                        faulted = true;
                        break;
                    }
                }
            }
        }

        self.close_endpoints();
        (0, produced, faulted)
    }

    async fn run_consumer(&self) -> (u64, u64, bool) {
        let mut active = self.inputs.clone();
        let mut received = 0u64;
        let mut produced = 0u64;
        let mut consecutive = 0u32;
        let mut faulted = false;
        let mut state = WorkerState::Running;
        let mut rotate = 0usize;

        loop {
            // While draining, stop observing cancellation so buffered
            // frames still reach the transform before end-of-stream.
            let cancel = (state != WorkerState::Draining).then_some(&self.cancel);
            let Some(recv) = Self::merge_pop(&mut active, &mut rotate, cancel).await else {
                // All inputs reported end-of-stream.
                break;
            };
            match recv {
                Recv::Frame(frame) => {
                    received += 1;
                    let seq = frame.seq;
                    match self.transform.apply(Some(frame), &self.params) {
                        Ok(Some(out)) => {
                            consecutive = 0;
                            if !self.outputs.is_empty() {
                                if self.broadcast(out).await {
                                    produced += 1;
                                } else {
                                    debug!(node = %self.node, "outputs closed, stopping");
                                    break;
                                }
                            }
                        }
                        Ok(None) => {
                            consecutive = 0;
                        }
                        Err(err) => {
                            if self.record_fault(Some(seq), &err.message, &mut consecutive) {
                                faulted = true;
                                break;
                            }
                        }
                    }
                }
                Recv::Cancelled => {
                    debug!(node = %self.node, "draining inputs after cancellation");
                    state = WorkerState::Draining;
                }
                // merge_pop folds end-of-stream into its return value.
                Recv::EndOfStream => break,
            }
        }

        self.close_endpoints();
        (received, produced, faulted)
    }

    /// Pops the next frame from whichever input is ready, in arrival
    /// order, rotating the poll start for fairness. Returns `None` once
    /// every input has ended, `Some(Recv::Cancelled)` when the signal
    /// trips while waiting.
    async fn merge_pop(
        active: &mut Vec<Channel>,
        rotate: &mut usize,
        cancel: Option<&Cancellation>,
    ) -> Option<Recv> {
        loop {
            if active.is_empty() {
                return None;
            }
            let count = active.len();
            let start = *rotate % count;
            *rotate = rotate.wrapping_add(1);

            let polls = futures::future::select_all((0..count).map(|offset| {
                let index = (start + offset) % count;
                let channel = active[index].clone();
                Box::pin(async move { (index, channel.pop_draining().await) })
                    as Pin<Box<dyn Future<Output = (usize, Recv)> + Send>>
            }));

            let ((index, recv), _, _) = match cancel {
                Some(cancel) => tokio::select! {
                    _ = cancel.cancelled() => return Some(Recv::Cancelled),
                    ready = polls => ready,
                },
                None => polls.await,
            };

            match recv {
                Recv::Frame(frame) => return Some(Recv::Frame(frame)),
                Recv::EndOfStream => {
                    active.remove(index);
                }
                Recv::Cancelled => return Some(Recv::Cancelled),
            }
        }
    }

    /// Enqueues a frame on every output edge, cloning the shared buffer
    /// cheaply. Pushes run concurrently so a slow branch only backpressures
    /// its own edge. Returns false once every output has closed.
    async fn broadcast(&self, frame: Frame) -> bool {
        match self.outputs.len() {
            0 => true,
            1 => self.outputs[0].push(frame).await.is_accepted(),
            _ => {
                let results = futures::future::join_all(
                    self.outputs.iter().map(|out| out.push(frame.clone())),
                )
                .await;
                results.iter().any(|r| r.is_accepted())
            }
        }
    }

    /// Applies the isolate-and-continue failure policy. Returns true when
    /// the worker must treat the fault as fatal.
    fn record_fault(&self, seq: Option<u64>, detail: &str, consecutive: &mut u32) -> bool {
        *consecutive += 1;
        warn!(
            node = %self.node,
            name = %self.name,
            seq,
            consecutive = *consecutive,
            detail,
            "transform fault, frame discarded"
        );
        emit(
            &self.events,
            RuntimeEvent::TransformFault {
                node: self.node,
                name: self.name.clone(),
                seq,
                detail: detail.to_string(),
                timestamp: now_ms(),
            },
        );
        if *consecutive >= self.failure_limit {
            error!(
                node = %self.node,
                name = %self.name,
                limit = self.failure_limit,
                "consecutive failure limit reached, worker is fatal"
            );
            emit(
                &self.events,
                RuntimeEvent::WorkerFaulted {
                    node: self.node,
                    name: self.name.clone(),
                    detail: format!(
                        "{} consecutive transform failures (limit {})",
                        *consecutive, self.failure_limit
                    ),
                    timestamp: now_ms(),
                },
            );
            return true;
        }
        false
    }

    /// Closes this worker's side of every channel it touches. Outputs
    /// close so downstream observes end-of-stream; inputs close so an
    /// upstream producer blocked on a full queue is released rather than
    /// left pushing to a dead consumer (the fatal-fault and dead-branch
    /// cases). For a normal drain both closes are idempotent no-ops.
    fn close_endpoints(&self) {
        for output in &self.outputs {
            output.close();
        }
        for input in &self.inputs {
            input.close();
        }
    }
}
