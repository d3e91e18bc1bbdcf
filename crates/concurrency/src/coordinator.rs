//! Transaction coordinator for database lock arbitration
//!
//! Every transaction asks for a lock on one database identity before it
//! touches storage:
//! - Read-only transactions share the lock with each other
//! - A read-write transaction holds it alone
//! - Requests that cannot be granted wait in a FIFO list per identity
//!
//! ## Grant rules
//!
//! ```text
//! acquire:  grant iff pending list is empty AND
//!           (nothing active OR (request is read-only AND no active writer))
//!           otherwise append to pending
//!
//! release:  remove from active set, then walk pending from the head:
//!           reader at head  -> grant, keep walking
//!           writer at head  -> grant only if nothing is active, then stop
//! ```
//!
//! A writer at the head of the list therefore blocks every reader behind it,
//! so a stream of late readers cannot starve a queued writer.
//!
//! Grant and abort callbacks run after the internal lock is released.

use crate::transaction::{CoordinatedTransaction, TransactionRef};
use parking_lot::{Condvar, Mutex};
use sqlworker_core::{AbortReason, DatabaseIdentity, Error, Result, TransactionId, TransactionMode};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Result of a non-blocking lock request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockGrant {
    /// The lock was granted; `lock_acquired` has been called
    Granted,
    /// The request waits behind `position` earlier requests
    Queued {
        /// Number of requests ahead of this one
        position: usize,
    },
}

/// Point-in-time view of one identity's lock state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockSnapshot {
    /// Active read-write transaction, if any
    pub writer: Option<TransactionId>,
    /// Active read-only transactions in grant order
    pub readers: Vec<TransactionId>,
    /// Waiting transactions in FIFO order
    pub pending: Vec<TransactionId>,
}

impl LockSnapshot {
    /// Ids of all active transactions
    pub fn active(&self) -> Vec<TransactionId> {
        self.writer.iter().chain(self.readers.iter()).copied().collect()
    }
}

/// Coordinator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorMetrics {
    /// Requests granted without waiting
    pub granted_immediately: u64,
    /// Requests that had to wait
    pub queued: u64,
    /// Waiting requests granted on a later release
    pub granted_from_queue: u64,
    /// Locks released by completed transactions
    pub released: u64,
    /// Transactions force-completed by shutdown or termination
    pub aborted: u64,
}

#[derive(Default)]
struct CoordinationInfo {
    pending: VecDeque<TransactionRef>,
    readers: Vec<TransactionRef>,
    writer: Option<TransactionRef>,
}

impl CoordinationInfo {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.readers.is_empty() && self.writer.is_none()
    }

    fn has_active(&self) -> bool {
        self.writer.is_some() || !self.readers.is_empty()
    }

    fn can_grant_now(&self, mode: TransactionMode) -> bool {
        if !self.pending.is_empty() || self.writer.is_some() {
            return false;
        }
        mode.is_read_only() || self.readers.is_empty()
    }

    fn activate(&mut self, txn: TransactionRef) {
        match txn.mode() {
            TransactionMode::ReadOnly => self.readers.push(txn),
            TransactionMode::ReadWrite => {
                debug_assert!(!self.has_active(), "writer granted alongside active lock");
                self.writer = Some(txn);
            }
        }
    }

    fn is_active(&self, id: TransactionId) -> bool {
        self.writer.as_ref().map(|w| w.id() == id).unwrap_or(false)
            || self.readers.iter().any(|r| r.id() == id)
    }

    fn contains(&self, id: TransactionId) -> bool {
        self.is_active(id) || self.pending.iter().any(|p| p.id() == id)
    }

    fn remove_active(&mut self, id: TransactionId) -> Option<TransactionRef> {
        if self.writer.as_ref().map(|w| w.id() == id).unwrap_or(false) {
            return self.writer.take();
        }
        let pos = self.readers.iter().position(|r| r.id() == id)?;
        Some(self.readers.remove(pos))
    }

    fn remove_pending(&mut self, id: TransactionId) -> Option<TransactionRef> {
        let pos = self.pending.iter().position(|p| p.id() == id)?;
        self.pending.remove(pos)
    }

    /// Grant as many waiters from the head as the rules allow
    fn promote_pending(&mut self) -> Vec<TransactionRef> {
        let mut granted = Vec::new();
        while self.writer.is_none() {
            let head_mode = match self.pending.front() {
                Some(head) => head.mode(),
                None => break,
            };
            if head_mode == TransactionMode::ReadWrite && !self.readers.is_empty() {
                break;
            }
            let Some(txn) = self.pending.pop_front() else {
                break;
            };
            self.activate(txn.clone());
            granted.push(txn);
            if head_mode == TransactionMode::ReadWrite {
                break;
            }
        }
        granted
    }

    fn drain_all(&mut self) -> Vec<TransactionRef> {
        let mut all: Vec<TransactionRef> = self.writer.take().into_iter().collect();
        all.append(&mut self.readers);
        all.extend(self.pending.drain(..));
        all
    }

    fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            writer: self.writer.as_ref().map(|w| w.id()),
            readers: self.readers.iter().map(|r| r.id()).collect(),
            pending: self.pending.iter().map(|p| p.id()).collect(),
        }
    }
}

#[derive(Default)]
struct CoordinatorState {
    databases: HashMap<DatabaseIdentity, CoordinationInfo>,
    /// Termination was requested; blocking waiters must give up
    interrupted: bool,
    /// Shutdown ran; every transaction has been aborted
    shut_down: bool,
}

/// Arbitrates database locks between transactions
///
/// Each database identity is coordinated independently, so transactions on
/// different databases never wait on each other.
///
/// # Memory Ordering
///
/// The metric counters use Relaxed ordering. They are observational only and
/// do not synchronize any other memory.
#[derive(Default)]
pub struct TransactionCoordinator {
    state: Mutex<CoordinatorState>,
    /// Notified whenever a lock is granted or the coordinator is interrupted
    lock_changed: Condvar,
    granted_immediately: AtomicU64,
    queued: AtomicU64,
    granted_from_queue: AtomicU64,
    released: AtomicU64,
    aborted: AtomicU64,
}

impl TransactionCoordinator {
    /// Create an empty coordinator
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the lock for `txn` without blocking
    ///
    /// On an immediate grant `txn.lock_acquired()` is called before this
    /// returns. A queued transaction gets `lock_acquired()` later, from the
    /// `release_lock` call that makes room for it.
    ///
    /// # Errors
    ///
    /// - `DuplicateTransaction` if `txn` is already active or waiting
    /// - `TransactionAborted` after [`shutdown`](Self::shutdown); `txn.aborted()`
    ///   is called as well
    pub fn acquire_lock(&self, txn: TransactionRef) -> Result<LockGrant> {
        let id = txn.id();
        let mut state = self.state.lock();

        if state.shut_down {
            drop(state);
            self.aborted.fetch_add(1, Ordering::Relaxed);
            txn.aborted(AbortReason::Shutdown);
            return Err(Error::TransactionAborted {
                id,
                reason: AbortReason::Shutdown,
            });
        }

        let info = state.databases.entry(txn.database().clone()).or_default();
        if info.contains(id) {
            return Err(Error::DuplicateTransaction(id));
        }

        if info.can_grant_now(txn.mode()) {
            info.activate(txn.clone());
            drop(state);
            self.granted_immediately.fetch_add(1, Ordering::Relaxed);
            debug!(
                target: "sqlworker::coord",
                txn = %id,
                database = %txn.database(),
                mode = %txn.mode(),
                "Lock granted"
            );
            txn.lock_acquired();
            return Ok(LockGrant::Granted);
        }

        let position = info.pending.len();
        info.pending.push_back(txn.clone());
        drop(state);
        self.queued.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "sqlworker::coord",
            txn = %id,
            database = %txn.database(),
            mode = %txn.mode(),
            position,
            "Lock request queued"
        );
        Ok(LockGrant::Queued { position })
    }

    /// Request the lock for `txn` and block until it is granted
    ///
    /// The calling thread sleeps until another caller releases the
    /// conflicting lock. There is no timeout: the wait ends only through a
    /// release, through [`interrupt`](Self::interrupt), or through
    /// [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    ///
    /// `TransactionAborted` if the wait was interrupted or the coordinator
    /// shut down. `txn.aborted()` has been called in that case.
    pub fn acquire_lock_blocking(&self, txn: TransactionRef) -> Result<()> {
        if self.acquire_lock(txn.clone())? == LockGrant::Granted {
            return Ok(());
        }

        let id = txn.id();
        let mut state = self.state.lock();
        loop {
            if state.shut_down {
                return Err(Error::TransactionAborted {
                    id,
                    reason: AbortReason::Shutdown,
                });
            }
            let position = state
                .databases
                .get(txn.database())
                .map(|info| (info.is_active(id), info.contains(id)));
            match position {
                Some((true, _)) => return Ok(()),
                Some((false, true)) => {}
                // Released by someone else while still waiting
                _ => return Err(Error::UnknownTransaction(id)),
            }
            if state.interrupted {
                let mut removed = None;
                let mut granted = Vec::new();
                if let Some(info) = state.databases.get_mut(txn.database()) {
                    removed = info.remove_pending(id);
                    // Waiters behind the one leaving may now be grantable.
                    granted = info.promote_pending();
                    if info.is_idle() {
                        state.databases.remove(txn.database());
                    }
                }
                drop(state);
                if removed.is_some() {
                    self.aborted.fetch_add(1, Ordering::Relaxed);
                    txn.aborted(AbortReason::TerminationRequested);
                }
                self.grant_waiters(&granted);
                warn!(
                    target: "sqlworker::coord",
                    txn = %id,
                    "Lock wait interrupted by termination request"
                );
                return Err(Error::TransactionAborted {
                    id,
                    reason: AbortReason::TerminationRequested,
                });
            }
            self.lock_changed.wait(&mut state);
        }
    }

    /// Release the lock held (or waited for) by `txn`
    ///
    /// Waiters that become eligible are granted and notified before this
    /// returns. Releasing after shutdown is a no-op, since shutdown already
    /// force-completed every transaction.
    ///
    /// # Errors
    ///
    /// `UnknownTransaction` if the coordinator never saw `txn`.
    pub fn release_lock(&self, txn: &dyn CoordinatedTransaction) -> Result<()> {
        let id = txn.id();
        let mut state = self.state.lock();
        if state.shut_down {
            return Ok(());
        }

        let Some(info) = state.databases.get_mut(txn.database()) else {
            return Err(Error::UnknownTransaction(id));
        };

        let was_active = if info.remove_active(id).is_some() {
            true
        } else if info.remove_pending(id).is_some() {
            false
        } else {
            return Err(Error::UnknownTransaction(id));
        };

        let granted = info.promote_pending();
        if info.is_idle() {
            state.databases.remove(txn.database());
        }
        drop(state);

        if was_active {
            self.released.fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            target: "sqlworker::coord",
            txn = %id,
            database = %txn.database(),
            was_active,
            granted = granted.len(),
            "Lock released"
        );

        self.grant_waiters(&granted);
        Ok(())
    }

    /// Notify waiters promoted from a pending list
    ///
    /// Must be called without the state lock held.
    fn grant_waiters(&self, granted: &[TransactionRef]) {
        if granted.is_empty() {
            return;
        }
        self.granted_from_queue
            .fetch_add(granted.len() as u64, Ordering::Relaxed);
        for waiter in granted {
            debug!(
                target: "sqlworker::coord",
                txn = %waiter.id(),
                database = %waiter.database(),
                mode = %waiter.mode(),
                "Queued lock granted"
            );
            waiter.lock_acquired();
        }
        self.lock_changed.notify_all();
    }

    /// Make every blocked [`acquire_lock_blocking`](Self::acquire_lock_blocking)
    /// call give up
    ///
    /// Safe to call from any thread. Non-blocking requests and already granted
    /// locks are unaffected until [`shutdown`](Self::shutdown).
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        if state.interrupted {
            return;
        }
        state.interrupted = true;
        self.lock_changed.notify_all();
        debug!(target: "sqlworker::coord", "Coordinator interrupted");
    }

    /// Abort every pending and active transaction and refuse new requests
    ///
    /// Returns the number of transactions aborted. Calling it again aborts
    /// nothing.
    pub fn shutdown(&self) -> usize {
        let mut state = self.state.lock();
        if state.shut_down {
            return 0;
        }
        state.shut_down = true;
        state.interrupted = true;
        let mut victims = Vec::new();
        for (_, mut info) in state.databases.drain() {
            victims.append(&mut info.drain_all());
        }
        self.lock_changed.notify_all();
        drop(state);

        self.aborted
            .fetch_add(victims.len() as u64, Ordering::Relaxed);
        for txn in &victims {
            txn.aborted(AbortReason::Shutdown);
        }
        info!(
            target: "sqlworker::coord",
            aborted = victims.len(),
            "Transaction coordinator shut down"
        );
        victims.len()
    }

    /// Whether [`shutdown`](Self::shutdown) has run
    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    /// Whether `txn` currently holds its lock
    pub fn is_active(&self, txn: &dyn CoordinatedTransaction) -> bool {
        self.state
            .lock()
            .databases
            .get(txn.database())
            .map(|info| info.is_active(txn.id()))
            .unwrap_or(false)
    }

    /// Lock state of one database identity
    pub fn lock_state(&self, database: &DatabaseIdentity) -> LockSnapshot {
        self.state
            .lock()
            .databases
            .get(database)
            .map(CoordinationInfo::snapshot)
            .unwrap_or_default()
    }

    /// Number of identities with active or waiting transactions
    pub fn database_count(&self) -> usize {
        self.state.lock().databases.len()
    }

    /// Snapshot of the coordinator counters
    pub fn metrics(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            granted_immediately: self.granted_immediately.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            granted_from_queue: self.granted_from_queue.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
        }
    }
}
