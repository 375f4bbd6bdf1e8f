//! Synthetic transforms for tests.
//!
//! Frames carry their payload in `meta["value"]`; sources count, processors
//! rewrite the value, sinks record what arrived. Counter state lives inside
//! the transform, so register a fresh instance per logical stream (two
//! nodes created from the same registration share one counter).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use crate::error::TransformError;
use crate::frame::Frame;
use crate::registry::{
    processor_fn, sink_fn, source_fn, FunctionRegistry, FunctionSpec, Params, Transform,
};

/// A frame whose payload is `value`.
pub fn value_frame(value: i64) -> Frame {
    Frame::empty().with_meta("value", value)
}

/// The payload of a frame, if present.
pub fn frame_value(frame: &Frame) -> Option<i64> {
    frame.meta.get("value").and_then(|v| v.as_i64())
}

/// A source emitting 0, 1, 2, ... in `meta["value"]`.
///
/// An integer `limit` parameter ends the stream after that many frames;
/// without it the source is free-running until cancelled or closed.
pub fn counter_source() -> Arc<dyn Transform> {
    let next = AtomicU64::new(0);
    source_fn(move |params: &Params| {
        let value = next.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = params.get("limit").and_then(|v| v.as_u64()) {
            if value >= limit {
                return Ok(None);
            }
        }
        Ok(Some(value_frame(value as i64)))
    })
}

/// A processor multiplying the payload by the `factor` parameter.
pub fn scale_processor() -> Arc<dyn Transform> {
    processor_fn(|frame: Frame, params: &Params| {
        let factor = params.get("factor").and_then(|v| v.as_i64()).unwrap_or(2);
        let value = frame_value(&frame)
            .ok_or_else(|| TransformError::new("frame has no value to scale"))?;
        Ok(Some(frame.with_meta("value", value * factor)))
    })
}

/// A pass-through processor stamping `meta["branch"]` from its `branch`
/// parameter, for fan-out tests that need to know which branch a frame
/// travelled.
pub fn tag_processor() -> Arc<dyn Transform> {
    processor_fn(|frame: Frame, params: &Params| {
        let branch = params
            .get("branch")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        Ok(Some(frame.with_meta("branch", branch)))
    })
}

/// A processor that burns `millis` of wall clock per frame, simulating a
/// CPU-bound transform for backpressure tests.
pub fn sleep_processor() -> Arc<dyn Transform> {
    processor_fn(|frame: Frame, params: &Params| {
        let millis = params.get("millis").and_then(|v| v.as_u64()).unwrap_or(50);
        std::thread::sleep(std::time::Duration::from_millis(millis));
        Ok(Some(frame))
    })
}

/// A processor that fails on every frame whose payload is below
/// `fail_under` (default 3) and passes the rest through.
pub fn flaky_processor() -> Arc<dyn Transform> {
    processor_fn(|frame: Frame, params: &Params| {
        let fail_under = params
            .get("fail_under")
            .and_then(|v| v.as_i64())
            .unwrap_or(3);
        match frame_value(&frame) {
            Some(value) if value < fail_under => {
                Err(TransformError::new(format!("refusing value {}", value)))
            }
            _ => Ok(Some(frame)),
        }
    })
}

/// Shared handle to everything a recording sink has accepted.
#[derive(Clone, Default, Debug)]
pub struct Recorded {
    entries: Arc<Mutex<Vec<(String, i64)>>>,
}

impl Recorded {
    /// Payloads in arrival order.
    pub fn values(&self) -> Vec<i64> {
        self.entries.lock().iter().map(|(_, v)| *v).collect()
    }

    /// `(branch, payload)` pairs in arrival order.
    pub fn entries(&self) -> Vec<(String, i64)> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A sink recording `(branch, value)` for every frame, plus the handle to
/// read the record back.
pub fn recording_sink() -> (Arc<dyn Transform>, Recorded) {
    let recorded = Recorded::default();
    let handle = recorded.clone();
    let sink = sink_fn(move |frame: Frame, _params: &Params| {
        let branch = frame
            .meta
            .get("branch")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let value = frame_value(&frame).unwrap_or_default();
        handle.entries.lock().push((branch, value));
        Ok(())
    });
    (sink, recorded)
}

/// A registry with one of everything, for compiler and wiring tests:
/// sources `src`/`src2`, processors `op` (scale, factor 2) and `op2`
/// (branch tag), and a discarding `sink`.
pub fn test_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register("src", FunctionSpec::source(counter_source()));
    registry.register("src2", FunctionSpec::source(counter_source()));
    registry.register(
        "op",
        FunctionSpec::processor(scale_processor()).with_default("factor", json!(2)),
    );
    registry.register(
        "op2",
        FunctionSpec::processor(tag_processor()).with_default("branch", json!("b")),
    );
    registry.register(
        "sink",
        FunctionSpec::sink(sink_fn(|_frame: Frame, _params: &Params| Ok(()))),
    );
    registry
}
