//! One-shot completion signal
//!
//! A `TaskSynchronizer` is signaled exactly once by the database thread and
//! waited on by the thread that handed it over: either to learn that a task
//! has run, or that a requested shutdown has finished.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct SyncState {
    signaled: bool,
    checked_for_termination: bool,
}

/// Signal-once, wait-once rendezvous
///
/// # Panics
///
/// `signal` panics if called a second time. A synchronizer stands for one
/// event; reusing it means two parties think they own the same completion.
#[derive(Debug, Default)]
pub struct TaskSynchronizer {
    state: Mutex<SyncState>,
    signaled_cond: Condvar,
}

impl TaskSynchronizer {
    /// Create an unsignaled synchronizer
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the event as complete and wake the waiter
    pub fn signal(&self) {
        let mut state = self.state.lock();
        assert!(!state.signaled, "TaskSynchronizer signaled twice");
        state.signaled = true;
        self.signaled_cond.notify_all();
    }

    /// Signal unless already signaled
    ///
    /// Returns `true` if this call performed the signal.
    pub fn try_signal(&self) -> bool {
        let mut state = self.state.lock();
        if state.signaled {
            return false;
        }
        state.signaled = true;
        self.signaled_cond.notify_all();
        true
    }

    /// Block until `signal` has been called
    ///
    /// Returns immediately if it already was.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while !state.signaled {
            self.signaled_cond.wait(&mut state);
        }
    }

    /// Block until signaled or `timeout` elapses
    ///
    /// Returns `true` if the synchronizer was signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.signaled {
            if self
                .signaled_cond
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.signaled;
            }
        }
        true
    }

    /// Whether `signal` has been called
    pub fn is_signaled(&self) -> bool {
        self.state.lock().signaled
    }

    /// Record that the task owning this synchronizer polled for termination
    pub fn set_has_checked_for_termination(&self) {
        self.state.lock().checked_for_termination = true;
    }

    /// Whether the owning task polled for termination
    pub fn has_checked_for_termination(&self) -> bool {
        self.state.lock().checked_for_termination
    }
}
