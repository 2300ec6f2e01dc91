//! Actor mailbox
//!
//! FIFO queue per actor. Enqueue never blocks: an unbounded mailbox always
//! accepts, a bounded one refuses with `MailboxFull` instead of waiting.

use crate::{ActorError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

struct MailboxState<T> {
    queue: VecDeque<T>,
    closed: bool,
}

/// Per-actor inbound queue
pub struct Mailbox<T> {
    /// Owner name, used in error reports
    owner: String,
    state: Mutex<MailboxState<T>>,
    /// `None` means unbounded
    capacity: Option<usize>,
    enqueued: AtomicU64,
    processed: AtomicU64,
    notify: Notify,
}

impl<T> fmt::Debug for Mailbox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("owner", &self.owner)
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> Mailbox<T> {
    pub fn unbounded(owner: impl Into<String>) -> Self {
        Self::with_capacity(owner, None)
    }

    pub fn bounded(owner: impl Into<String>, capacity: usize) -> Self {
        Self::with_capacity(owner, Some(capacity))
    }

    pub fn with_capacity(owner: impl Into<String>, capacity: Option<usize>) -> Self {
        debug_assert!(capacity != Some(0), "capacity must be positive");

        Self {
            owner: owner.into(),
            state: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                closed: false,
            }),
            capacity,
            enqueued: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Append a message. Returns the queue depth after the push.
    pub fn enqueue(&self, item: T) -> Result<usize> {
        let depth = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(ActorError::stopped(&self.owner));
            }
            if let Some(capacity) = self.capacity {
                if state.queue.len() >= capacity {
                    return Err(ActorError::mailbox_full(&self.owner, state.queue.len(), capacity));
                }
            }
            state.queue.push_back(item);
            state.queue.len()
        };

        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
        Ok(depth)
    }

    /// Take the next message without waiting
    pub fn try_dequeue(&self) -> Option<T> {
        let item = self.state.lock().queue.pop_front();
        if item.is_some() {
            self.processed.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Wait for the next message.
    ///
    /// Returns `None` once the mailbox is closed and drained.
    pub async fn dequeue_next(&self) -> Option<T> {
        loop {
            if let Some(item) = self.try_dequeue() {
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }
            // A push between the check and here leaves a permit behind.
            self.notify.notified().await;
        }
    }

    /// Drop every pending message, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.queue.len();
        state.queue.clear();
        dropped
    }

    /// Refuse further messages and drop the pending ones
    pub fn close(&self) -> usize {
        let dropped = {
            let mut state = self.state.lock();
            state.closed = true;
            let dropped = state.queue.len();
            state.queue.clear();
            dropped
        };
        self.notify.notify_waiters();
        self.notify.notify_one();
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Total messages accepted
    pub fn enqueued_count(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Total messages handed out
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}
