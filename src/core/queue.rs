//! In-memory rendezvous queue for InputBridge.
//!
//! Holds two FIFO sequences behind one lock:
//! - pending: messages submitted before anyone asked for them
//! - waiters: fetch calls suspended until a message arrives
//!
//! At most one of them is non-empty at any time. A message is owned by the
//! pending queue, by exactly one waiter's one-shot slot, or by the fetch call
//! that read it out.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::oneshot;

use super::message::Message;

/// Queue failures. None of these occur in the default unbounded mode while
/// the process is running normally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("queue is full (capacity {capacity})")]
    Full { capacity: usize },
}

/// What a bounded queue does when a submit finds it at capacity.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the new message.
    #[default]
    Reject,
    /// Discard the oldest pending message to make room.
    DropOldest,
}

/// Where a submitted message went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written straight into a suspended fetcher's slot.
    HandedOff { waiter: u64 },
    /// Appended to the pending queue, which now holds `depth` messages.
    Queued { depth: usize },
}

struct Waiter {
    id: u64,
    slot: oneshot::Sender<Message>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Message>,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
    dropped: u64,
    closed: bool,
}

impl QueueState {
    /// Give `message` to the oldest waiter still listening, or return it.
    fn hand_off(&mut self, mut message: Message) -> std::result::Result<u64, Message> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.slot.send(message) {
                Ok(()) => return Ok(waiter.id),
                Err(returned) => {
                    tracing::debug!(waiter = waiter.id, "Skipping waiter whose receiver is gone");
                    message = returned;
                }
            }
        }
        Err(message)
    }

    fn check_invariant(&self) {
        assert!(
            self.pending.is_empty() || self.waiters.is_empty(),
            "rendezvous queue holds {} pending messages alongside {} waiters",
            self.pending.len(),
            self.waiters.len()
        );
    }
}

struct Inner {
    state: Mutex<QueueState>,
    capacity: Option<usize>,
    overflow: OverflowPolicy,
}

/// Shared handle to the rendezvous queue. Cloning is cheap; all clones see
/// the same state.
#[derive(Clone)]
pub struct RendezvousQueue {
    inner: Arc<Inner>,
}

impl Default for RendezvousQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RendezvousQueue {
    /// Create an unbounded queue.
    pub fn new() -> Self {
        Self::with_limits(None, OverflowPolicy::default())
    }

    /// Create a queue holding at most `capacity` pending messages.
    pub fn bounded(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self::with_limits(Some(capacity), overflow)
    }

    pub fn with_limits(capacity: Option<usize>, overflow: OverflowPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                capacity,
                overflow,
            }),
        }
    }

    // The critical sections never await and only panic on an invariant
    // violation, so a poisoned lock still guards consistent state.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit a message: wake the oldest waiter with it, or queue it.
    pub fn submit(&self, message: impl Into<Message>) -> Result<Delivery, QueueError> {
        let message = message.into();
        let mut state = self.lock();

        if state.closed {
            return Err(QueueError::Closed);
        }

        let mut evicted = false;
        let delivery = match state.hand_off(message) {
            Ok(waiter) => Delivery::HandedOff { waiter },
            Err(message) => {
                if let Some(capacity) = self.inner.capacity {
                    if state.pending.len() >= capacity {
                        match self.inner.overflow {
                            OverflowPolicy::Reject => return Err(QueueError::Full { capacity }),
                            OverflowPolicy::DropOldest => {
                                state.pending.pop_front();
                                state.dropped += 1;
                                evicted = true;
                            }
                        }
                    }
                }
                state.pending.push_back(message);
                Delivery::Queued {
                    depth: state.pending.len(),
                }
            }
        };

        state.check_invariant();
        drop(state);

        if evicted {
            tracing::warn!("Queue at capacity, dropped oldest pending message");
        }
        match delivery {
            Delivery::HandedOff { waiter } => {
                tracing::debug!(waiter, "Handed message directly to waiting fetch");
            }
            Delivery::Queued { depth } => {
                tracing::debug!(depth, "Queued message");
            }
        }

        Ok(delivery)
    }

    /// Take the next message, suspending until one is submitted.
    ///
    /// Dropping the returned future while it is suspended deregisters the
    /// waiter. If a message had already been written into its slot, that
    /// message goes back to the head of the queue.
    pub async fn fetch(&self) -> Result<Message, QueueError> {
        let (id, slot) = {
            let mut state = self.lock();

            if let Some(message) = state.pending.pop_front() {
                return Ok(message);
            }
            if state.closed {
                return Err(QueueError::Closed);
            }

            let (tx, rx) = oneshot::channel();
            let id = state.next_waiter_id;
            state.next_waiter_id += 1;
            state.waiters.push_back(Waiter { id, slot: tx });
            state.check_invariant();
            (id, rx)
        };

        tracing::debug!(waiter = id, "Fetch waiting for a message");

        let mut registration = Registration {
            queue: self,
            id,
            slot: Some(slot),
        };
        registration.wait().await
    }

    /// Close the queue. Suspended fetches fail with [`QueueError::Closed`],
    /// pending messages are discarded. Returns how many were discarded.
    pub fn close(&self) -> usize {
        let mut state = self.lock();
        if state.closed {
            return 0;
        }

        state.closed = true;
        let discarded = state.pending.len();
        let waiters = state.waiters.len();
        state.pending.clear();
        state.waiters.clear();
        drop(state);

        tracing::info!(discarded, waiters, "Rendezvous queue closed");
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            pending: state.pending.len(),
            waiters: state.waiters.len(),
            dropped: state.dropped,
            closed: state.closed,
        }
    }

    fn restore(&self, id: u64, slot: &mut oneshot::Receiver<Message>) {
        let mut state = self.lock();

        if let Some(pos) = state.waiters.iter().position(|w| w.id == id) {
            state.waiters.remove(pos);
            drop(state);
            tracing::debug!(waiter = id, "Fetch cancelled before delivery");
            return;
        }

        let Ok(message) = slot.try_recv() else {
            return;
        };

        if state.closed {
            drop(state);
            tracing::warn!(waiter = id, "Fetch cancelled after close, message discarded");
            return;
        }

        if let Err(message) = state.hand_off(message) {
            state.pending.push_front(message);
        }
        state.check_invariant();
        drop(state);

        tracing::debug!(waiter = id, "Fetch cancelled after delivery, message requeued at head");
    }
}

/// A registered waiter; deregisters itself if dropped before completion.
struct Registration<'a> {
    queue: &'a RendezvousQueue,
    id: u64,
    slot: Option<oneshot::Receiver<Message>>,
}

impl Registration<'_> {
    async fn wait(&mut self) -> Result<Message, QueueError> {
        let Some(slot) = self.slot.as_mut() else {
            return Err(QueueError::Closed);
        };
        let received = slot.await;
        self.slot = None;
        received.map_err(|_| QueueError::Closed)
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if let Some(mut slot) = self.slot.take() {
            self.queue.restore(self.id, &mut slot);
        }
    }
}

/// Queue statistics.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub waiters: usize,
    pub dropped: u64,
    pub closed: bool,
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Queue Stats:")?;
        writeln!(f, "  Pending: {}", self.pending)?;
        writeln!(f, "  Waiters: {}", self.waiters)?;
        writeln!(f, "  Dropped: {}", self.dropped)?;
        write!(f, "  Closed:  {}", self.closed)
    }
}
