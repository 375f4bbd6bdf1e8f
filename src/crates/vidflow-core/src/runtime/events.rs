//! Structured runtime events for observability.
//!
//! Faults and lifecycle transitions are delivered on an unbounded event
//! channel handed to the host via
//! [`Runtime::take_events`](super::Runtime::take_events). Dropping the
//! receiver never stalls the pipeline; events are simply discarded.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::graph::{NodeId, SegmentId};

use super::RunStatus;

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// One runtime event with a millisecond timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// All startup preflight passed; workers are about to spawn.
    RunStarted { timestamp: i64 },
    /// A sequential stage began executing.
    StageStarted { stage: usize, timestamp: i64 },
    /// A worker entered its processing loop.
    WorkerStarted {
        node: NodeId,
        name: String,
        timestamp: i64,
    },
    /// A transform failed on one frame; the frame was discarded and the
    /// worker keeps running.
    TransformFault {
        node: NodeId,
        name: String,
        /// Sequence number of the offending frame, when one was involved.
        seq: Option<u64>,
        detail: String,
        timestamp: i64,
    },
    /// A worker hit the consecutive-failure limit and shut down.
    WorkerFaulted {
        node: NodeId,
        name: String,
        detail: String,
        timestamp: i64,
    },
    /// A timed segment's deadline fired; its sources were closed.
    SegmentDeadline { segment: SegmentId, timestamp: i64 },
    /// A worker finished, with its frame counts.
    WorkerStopped {
        node: NodeId,
        name: String,
        frames_in: u64,
        frames_out: u64,
        timestamp: i64,
    },
    /// Cancellation was observed.
    RunCancelled { timestamp: i64 },
    /// The run finished with the given status.
    RunCompleted { status: RunStatus, timestamp: i64 },
}

impl RuntimeEvent {
    pub fn timestamp(&self) -> i64 {
        match self {
            RuntimeEvent::RunStarted { timestamp }
            | RuntimeEvent::StageStarted { timestamp, .. }
            | RuntimeEvent::WorkerStarted { timestamp, .. }
            | RuntimeEvent::TransformFault { timestamp, .. }
            | RuntimeEvent::WorkerFaulted { timestamp, .. }
            | RuntimeEvent::SegmentDeadline { timestamp, .. }
            | RuntimeEvent::WorkerStopped { timestamp, .. }
            | RuntimeEvent::RunCancelled { timestamp }
            | RuntimeEvent::RunCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// The node the event concerns, when it concerns one.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            RuntimeEvent::WorkerStarted { node, .. }
            | RuntimeEvent::TransformFault { node, .. }
            | RuntimeEvent::WorkerFaulted { node, .. }
            | RuntimeEvent::WorkerStopped { node, .. } => Some(*node),
            _ => None,
        }
    }
}

/// Sender half of the event stream; sending never blocks and ignores a
/// dropped receiver.
pub(crate) type EventTx = tokio::sync::mpsc::UnboundedSender<RuntimeEvent>;

pub(crate) fn emit(events: &EventTx, event: RuntimeEvent) {
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_tagged() {
        let event = RuntimeEvent::TransformFault {
            node: NodeId(2),
            name: "blur".to_string(),
            seq: Some(41),
            detail: "kernel must be odd".to_string(),
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "transform_fault");
        assert_eq!(json["node"], 2);
        assert_eq!(json["seq"], 41);
        assert_eq!(event.node(), Some(NodeId(2)));
    }

    #[test]
    fn timestamp_accessor_covers_every_variant() {
        let ts = 123;
        let events = vec![
            RuntimeEvent::RunStarted { timestamp: ts },
            RuntimeEvent::RunCancelled { timestamp: ts },
            RuntimeEvent::SegmentDeadline {
                segment: SegmentId(0),
                timestamp: ts,
            },
        ];
        assert!(events.iter().all(|e| e.timestamp() == ts));
    }
}
