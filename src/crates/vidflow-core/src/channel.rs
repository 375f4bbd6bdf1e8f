//! Bounded FIFO channels connecting workers.
//!
//! The channel is the only cross-worker shared state in a running
//! pipeline. Its contract carries the runtime's backpressure and shutdown
//! semantics:
//!
//! - [`push`](Channel::push) blocks while the queue is full and never
//!   drops a frame; after [`close`](Channel::close) it returns the frame
//!   back instead of enqueuing.
//! - [`pop`](Channel::pop) blocks for an item and reports
//!   [`Recv::EndOfStream`] only once the channel is closed **and**
//!   drained, so closing never loses buffered frames.
//! - [`close`](Channel::close) is idempotent and wakes every blocked
//!   pusher and popper.
//!
//! FIFO order holds per producer. Waiting is implemented with two
//! [`Notify`] instances whose futures are registered while the queue lock
//! is held, so a wakeup between the full/empty check and the await cannot
//! be lost.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::frame::Frame;
use crate::runtime::Cancellation;

/// Result of a [`Channel::push`].
#[derive(Debug)]
pub enum PushOutcome {
    /// The frame was enqueued.
    Accepted,
    /// The channel was closed; the frame is handed back, not enqueued.
    Closed(Frame),
}

impl PushOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PushOutcome::Accepted)
    }
}

/// Result of a [`Channel::pop`].
#[derive(Debug, PartialEq)]
pub enum Recv {
    Frame(Frame),
    /// Closed and fully drained.
    EndOfStream,
    /// The caller's cancellation signal tripped while waiting.
    Cancelled,
}

struct State {
    queue: VecDeque<Frame>,
    closed: bool,
}

struct Shared {
    state: Mutex<State>,
    capacity: usize,
    /// Signalled when space frees up or the channel closes.
    space: Notify,
    /// Signalled when an item arrives or the channel closes.
    items: Notify,
}

/// A bounded FIFO queue of frames. Cloning shares the same queue.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<Shared>,
}

impl Channel {
    /// Creates a channel holding at most `capacity` frames (at least 1).
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "channel capacity must be at least 1");
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                capacity,
                space: Notify::new(),
                items: Notify::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Closes the channel. Idempotent; wakes all blocked pushers and
    /// poppers. Buffered frames remain poppable until drained.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.shared.space.notify_waiters();
        self.shared.items.notify_waiters();
    }

    /// Enqueues a frame, waiting for space under backpressure.
    pub async fn push(&self, frame: Frame) -> PushOutcome {
        loop {
            let notified = self.shared.space.notified();
            tokio::pin!(notified);
            {
                let mut state = self.shared.state.lock();
                if state.closed {
                    return PushOutcome::Closed(frame);
                }
                if state.queue.len() < self.shared.capacity {
                    state.queue.push_back(frame);
                    drop(state);
                    self.shared.items.notify_one();
                    return PushOutcome::Accepted;
                }
                notified.as_mut().enable();
            }
            notified.await;
        }
    }

    /// Dequeues a frame, the end-of-stream marker, or a cancellation.
    pub async fn pop(&self, cancel: &Cancellation) -> Recv {
        tokio::select! {
            _ = cancel.cancelled() => Recv::Cancelled,
            recv = self.pop_open() => recv,
        }
    }

    /// Dequeues without observing cancellation; used by workers draining
    /// their inputs after the shutdown signal.
    pub async fn pop_draining(&self) -> Recv {
        self.pop_open().await
    }

    /// Bounded-wait pop for supervisors polling deadlines. `None` means the
    /// timeout elapsed first.
    pub async fn try_pop(&self, timeout: Duration) -> Option<Recv> {
        tokio::time::timeout(timeout, self.pop_open()).await.ok()
    }

    async fn pop_open(&self) -> Recv {
        loop {
            let notified = self.shared.items.notified();
            tokio::pin!(notified);
            {
                let mut state = self.shared.state.lock();
                if let Some(frame) = state.queue.pop_front() {
                    drop(state);
                    self.shared.space.notify_one();
                    return Recv::Frame(frame);
                }
                if state.closed {
                    return Recv::EndOfStream;
                }
                notified.as_mut().enable();
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Channel")
            .field("capacity", &self.shared.capacity)
            .field("len", &state.queue.len())
            .field("closed", &state.closed)
            .finish()
    }
}
