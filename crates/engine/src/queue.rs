//! FIFO task queue feeding the database thread.
//!
//! Any number of producers push; exactly one consumer takes. `take` blocks
//! while the queue is empty. Once killed, the queue refuses new items and
//! `take` returns `None`.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct QueueInner<T> {
    items: VecDeque<T>,
    killed: bool,
}

/// Blocking multi-producer, single-consumer FIFO queue
pub struct TaskQueue<T> {
    inner: Mutex<QueueInner<T>>,
    work_ready: Condvar,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    /// Create an empty, open queue
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                killed: false,
            }),
            work_ready: Condvar::new(),
        }
    }

    /// Append `item` at the tail
    ///
    /// Never blocks. Returns the item back if the queue has been killed.
    pub fn push(&self, item: T) -> Result<(), T> {
        {
            let mut inner = self.inner.lock();
            if inner.killed {
                return Err(item);
            }
            inner.items.push_back(item);
        }
        self.work_ready.notify_one();
        Ok(())
    }

    /// Remove the head, blocking while the queue is empty
    ///
    /// Returns `None` once the queue has been killed.
    pub fn take(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if inner.killed {
                return None;
            }
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            self.work_ready.wait(&mut inner);
        }
    }

    /// Close the queue and return everything still queued, in order
    ///
    /// Wakes a consumer blocked in `take`. Killing twice returns an empty
    /// vector the second time.
    pub fn kill(&self) -> Vec<T> {
        let mut inner = self.inner.lock();
        inner.killed = true;
        let remaining = inner.items.drain(..).collect();
        self.work_ready.notify_all();
        remaining
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
