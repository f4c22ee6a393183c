//! Node events and the bounded event queue.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use crate::consts::EVENT_QUEUE_CAPACITY;
use crate::error::FrameError;
use crate::io::Channel;
use crate::protocol::Frame;

/// Events surfaced by a node to its consumer.
#[derive(Clone, Debug)]
pub enum Event {
    /// A channel came up.
    ChannelOpen(Channel),
    /// A channel went down (transport termination or idle eviction).
    ChannelClose(Channel),
    /// A valid frame was received.
    Frame(Frame, Channel),
    /// A recognized but invalid frame was received and dropped.
    ParseError {
        /// What went wrong.
        error: FrameError,
        /// The raw bytes of the rejected frame.
        raw: Vec<u8>,
        /// The channel the bytes arrived on.
        channel: Channel,
    },
    /// A stream request was sent towards an ArduPilot device.
    StreamRequested(Channel),
}

struct QueueState {
    buf: VecDeque<Event>,
    closed: bool,
}

struct QueueShared {
    state: Mutex<QueueState>,
    cond: Condvar,
    capacity: usize,
}

/// Bounded multi-producer single-consumer event queue.
///
/// On overflow the oldest non-frame event is evicted first; frames are never
/// dropped — producers block instead, which backpressures the channel
/// readers.
#[derive(Clone)]
pub(crate) struct EventQueue {
    shared: Arc<QueueShared>,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAPACITY)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState {
                    buf: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                cond: Condvar::new(),
                capacity,
            }),
        }
    }

    /// Enqueues an event. Events pushed after [`EventQueue::close`] are
    /// dropped.
    pub(crate) fn push(&self, event: Event) {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if state.closed {
                return;
            }
            if state.buf.len() < self.shared.capacity {
                state.buf.push_back(event);
                self.shared.cond.notify_all();
                return;
            }

            let stale = state
                .buf
                .iter()
                .position(|event| !matches!(event, Event::Frame(..)));
            match stale {
                Some(index) => {
                    state.buf.remove(index);
                }
                // Full of frames: wait for the consumer.
                None => state = self.shared.cond.wait(state).unwrap(),
            }
        }
    }

    /// Dequeues the next event, blocking while the queue is open and empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub(crate) fn pop(&self) -> Option<Event> {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if let Some(event) = state.buf.pop_front() {
                self.shared.cond.notify_all();
                return Some(event);
            }
            if state.closed {
                return None;
            }
            state = self.shared.cond.wait(state).unwrap();
        }
    }

    /// Closes the queue: already buffered events remain consumable.
    pub(crate) fn close(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.closed = true;
        self.shared.cond.notify_all();
    }
}

/// Iterator over node events.
///
/// Blocks on [`Iterator::next`] while the node is live; ends once the node
/// is closed and all in-flight events have been consumed.
pub struct Events {
    queue: EventQueue,
}

impl Events {
    pub(crate) fn new(queue: EventQueue) -> Self {
        Self { queue }
    }
}

impl Iterator for Events {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        self.queue.pop()
    }
}

#[cfg(test)]
mod event_queue_tests {
    use super::*;
    use crate::io::ChannelInfo;
    use crate::utils::UniqueId;

    fn channel() -> Channel {
        Channel::stub(
            UniqueId::new(),
            ChannelInfo::Custom {
                name: "test".to_string(),
            },
        )
    }

    #[test]
    fn events_flow_in_order() {
        let queue = EventQueue::new();
        queue.push(Event::ChannelOpen(channel()));
        queue.push(Event::ChannelClose(channel()));

        assert!(matches!(queue.pop(), Some(Event::ChannelOpen(_))));
        assert!(matches!(queue.pop(), Some(Event::ChannelClose(_))));

        queue.close();
        assert!(queue.pop().is_none());
    }

    #[test]
    fn buffered_events_survive_close() {
        let queue = EventQueue::new();
        queue.push(Event::ChannelOpen(channel()));
        queue.close();

        assert!(matches!(queue.pop(), Some(Event::ChannelOpen(_))));
        assert!(queue.pop().is_none());

        // Pushes after close are dropped.
        queue.push(Event::ChannelOpen(channel()));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn overflow_evicts_non_frame_events_first() {
        let queue = EventQueue::with_capacity(2);
        queue.push(Event::ChannelOpen(channel()));
        queue.push(Event::ChannelClose(channel()));
        queue.push(Event::StreamRequested(channel()));

        // The oldest non-frame event was evicted to make room.
        assert!(matches!(queue.pop(), Some(Event::ChannelClose(_))));
        assert!(matches!(queue.pop(), Some(Event::StreamRequested(_))));
        queue.close();
        assert!(queue.pop().is_none());
    }
}
