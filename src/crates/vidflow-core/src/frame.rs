//! The unit flowing through a pipeline.
//!
//! A [`Frame`] is opaque to the core: a shared, immutable pixel buffer plus
//! a small per-recipient header (sequence number, timestamp, metadata).
//! Cloning a frame is cheap — the buffer is reference-counted and only the
//! header is copied — which is what makes fan-out broadcasting affordable.
//! A transform that wants to mutate pixels first privatizes the buffer with
//! [`Frame::make_mut`]. Frames are moved into channels on push, so nothing
//! can mutate a frame after it has been handed downstream.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Raw pixel storage. The core never interprets `data`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }
}

/// A frame: shared pixels plus an independent header.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    buffer: Arc<FrameBuffer>,
    /// Sequence number assigned by the producing source.
    pub seq: u64,
    /// Capture timestamp, milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Free-form metadata, forwarded alongside the pixels.
    pub meta: HashMap<String, Value>,
}

impl Frame {
    pub fn new(buffer: FrameBuffer) -> Self {
        Self {
            buffer: Arc::new(buffer),
            seq: 0,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            meta: HashMap::new(),
        }
    }

    /// A frame with no pixels, useful for metadata-only streams and tests.
    pub fn empty() -> Self {
        Self::new(FrameBuffer::default())
    }

    /// Builder-style metadata insertion.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Mutable access to the pixel buffer.
    ///
    /// If the buffer is shared with other frames (after a fan-out), it is
    /// copied first, so recipients on other branches never observe the
    /// mutation.
    pub fn make_mut(&mut self) -> &mut FrameBuffer {
        Arc::make_mut(&mut self.buffer)
    }

    /// True when two frames share one underlying buffer.
    pub fn shares_buffer_with(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_the_buffer() {
        let frame = Frame::new(FrameBuffer::new(2, 2, vec![1, 2, 3, 4]));
        let copy = frame.clone();
        assert!(frame.shares_buffer_with(&copy));
        assert_eq!(copy.buffer().data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn headers_are_independent() {
        let frame = Frame::empty().with_meta("value", 1);
        let mut copy = frame.clone();
        copy.meta.insert("value".into(), Value::from(2));
        copy.seq = 9;
        assert_eq!(frame.meta["value"], Value::from(1));
        assert_eq!(frame.seq, 0);
    }

    #[test]
    fn make_mut_privatizes_a_shared_buffer() {
        let frame = Frame::new(FrameBuffer::new(1, 1, vec![7]));
        let mut copy = frame.clone();
        copy.make_mut().data[0] = 9;
        assert!(!frame.shares_buffer_with(&copy));
        assert_eq!(frame.buffer().data[0], 7);
        assert_eq!(copy.buffer().data[0], 9);
    }

    #[test]
    fn make_mut_without_sharing_keeps_the_buffer() {
        let mut frame = Frame::new(FrameBuffer::new(1, 1, vec![7]));
        frame.make_mut().data[0] = 9;
        assert_eq!(frame.buffer().data[0], 9);
    }
}
