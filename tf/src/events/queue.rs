//! Bounded drop-oldest event queue for streaming consumers
//!
//! Streaming is best-effort: a slow consumer loses the oldest events, never
//! blocks the run. The JSONL runlog is the authoritative record.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;
use tracing::debug;

use super::StreamMessage;

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Multi-producer single-consumer bounded queue with drop-oldest overflow
pub struct EventQueue {
    inner: Mutex<VecDeque<StreamMessage>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue without blocking; overflow evicts the oldest message
    pub fn push(&self, message: StreamMessage) {
        {
            let mut queue = self.inner.lock().expect("event queue poisoned");
            if queue.len() >= self.capacity {
                queue.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(dropped, "EventQueue: overflow, dropped oldest message");
            }
            queue.push_back(message);
        }
        self.notify.notify_one();
    }

    /// Await the next message
    pub async fn pop(&self) -> StreamMessage {
        loop {
            let notified = self.notify.notified();
            if let Some(message) = self.inner.lock().expect("event queue poisoned").pop_front() {
                return message;
            }
            notified.await;
        }
    }

    /// Non-blocking pop, None when empty
    pub fn try_pop(&self) -> Option<StreamMessage> {
        self.inner.lock().expect("event queue poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("event queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages evicted so far
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
