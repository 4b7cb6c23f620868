use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

/// Items that carry an id which [`MessageQueue::remove`] can match on.
pub trait Identified {
    type Id: PartialEq;

    fn id(&self) -> Self::Id;
}

/// Thread-safe FIFO with a blocking `pop` and a shutdown signal.
///
/// `shutdown` wakes every thread blocked in [`pop`](Self::pop); once shut
/// down, `pop` returns `None` immediately and never blocks again.
pub struct MessageQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    running: bool,
}

impl<T> MessageQueue<T> {
    /// Create an empty, running queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                running: true,
            }),
            available: Condvar::new(),
        }
    }

    /// Append an item to the tail and wake one blocked popper.
    pub fn push(&self, item: T) {
        self.lock().items.push_back(item);
        self.available.notify_one();
    }

    /// Append several items in order under a single lock.
    pub fn extend<I: IntoIterator<Item = T>>(&self, items: I) {
        let added = {
            let mut state = self.lock();
            let before = state.items.len();
            state.items.extend(items);
            state.items.len() - before
        };
        match added {
            0 => {}
            1 => self.available.notify_one(),
            _ => self.available.notify_all(),
        }
    }

    /// Block until an item is available, then remove and return the head.
    ///
    /// Returns `None` once the queue has been shut down, even if the queue
    /// was empty and the caller was already waiting.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if !state.running {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if !state.running {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            state = self
                .available
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Remove the head without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Snapshot of the number of queued items.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// True when no items are queued.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Remove the first queued item matching `predicate`.
    pub fn remove_where<F>(&self, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut state = self.lock();
        let index = state.items.iter().position(|item| predicate(item))?;
        state.items.remove(index)
    }

    /// Remove and return every queued item, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.lock().items.drain(..).collect()
    }

    /// Discard every queued item, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.items.len();
        state.items.clear();
        dropped
    }

    /// Mark the queue as stopped and wake every blocked popper.
    pub fn shutdown(&self) {
        let pending = {
            let mut state = self.lock();
            state.running = false;
            state.items.len()
        };
        self.available.notify_all();
        debug!(pending, "message queue shut down");
    }

    /// False once [`shutdown`](Self::shutdown) has been called.
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    // A panic in another thread while holding the lock leaves the deque intact.
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Identified> MessageQueue<T> {
    /// Cancel a queued, not-yet-consumed item by id.
    pub fn remove(&self, id: T::Id) -> Option<T> {
        self.remove_where(|item| item.id() == id)
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for MessageQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MessageQueue")
            .field("len", &state.items.len())
            .field("running", &state.running)
            .finish()
    }
}
