//! Transactions as seen by the coordinator
//!
//! The coordinator only needs to know which database a transaction targets,
//! which lock mode it wants, and how to tell it that the lock was granted or
//! that it was aborted. `CoordinatedTransaction` captures exactly that;
//! `Transaction` is the default implementation used by the database thread
//! and by tests.

use parking_lot::Mutex;
use sqlworker_core::{
    AbortReason, DatabaseIdentity, TransactionId, TransactionMode, TransactionOutcome,
};
use std::fmt;
use std::sync::Arc;

/// Shared reference to a transaction held by the coordinator
pub type TransactionRef = Arc<dyn CoordinatedTransaction>;

/// A transaction that can wait for a database lock
///
/// Callbacks are always invoked without any coordinator lock held, so an
/// implementation may schedule follow-up work from them. It must not call
/// back into the coordinator synchronously.
pub trait CoordinatedTransaction: Send + Sync {
    /// Unique id of this transaction
    fn id(&self) -> TransactionId;

    /// Database the lock is requested on
    fn database(&self) -> &DatabaseIdentity;

    /// Requested lock mode
    fn mode(&self) -> TransactionMode;

    /// The coordinator granted the lock
    fn lock_acquired(&self);

    /// The coordinator force-completed the transaction
    fn aborted(&self, reason: AbortReason);

    /// The transaction finished its work and is about to release its lock
    fn completed(&self, _outcome: TransactionOutcome) {}
}

/// Lifecycle state of a [`Transaction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Waiting for the coordinator
    Pending,
    /// Holds its lock
    Active,
    /// Committed by the storage backend
    Committed,
    /// Rolled back by the storage backend
    RolledBack,
    /// Force-completed by the coordinator
    Aborted {
        /// Why the coordinator aborted it
        reason: AbortReason,
    },
}

impl TransactionStatus {
    /// True once the transaction can no longer change state
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Committed
                | TransactionStatus::RolledBack
                | TransactionStatus::Aborted { .. }
        )
    }
}

type GrantCallback = Box<dyn Fn(&Transaction) + Send + Sync>;
type AbortCallback = Box<dyn Fn(&Transaction, AbortReason) + Send + Sync>;

/// Default transaction type
///
/// Tracks its own [`TransactionStatus`] and optionally runs a callback when
/// the lock is granted or the transaction is aborted.
pub struct Transaction {
    id: TransactionId,
    database: DatabaseIdentity,
    mode: TransactionMode,
    status: Mutex<TransactionStatus>,
    on_granted: Option<GrantCallback>,
    on_aborted: Option<AbortCallback>,
}

impl Transaction {
    /// Create a pending transaction with a fresh id
    pub fn new(database: DatabaseIdentity, mode: TransactionMode) -> Self {
        Self {
            id: TransactionId::next(),
            database,
            mode,
            status: Mutex::new(TransactionStatus::Pending),
            on_granted: None,
            on_aborted: None,
        }
    }

    /// Create a pending read-only transaction
    pub fn read_only(database: DatabaseIdentity) -> Self {
        Self::new(database, TransactionMode::ReadOnly)
    }

    /// Create a pending read-write transaction
    pub fn read_write(database: DatabaseIdentity) -> Self {
        Self::new(database, TransactionMode::ReadWrite)
    }

    /// Run `callback` when the coordinator grants the lock
    pub fn on_granted(mut self, callback: impl Fn(&Transaction) + Send + Sync + 'static) -> Self {
        self.on_granted = Some(Box::new(callback));
        self
    }

    /// Run `callback` when the coordinator aborts the transaction
    pub fn on_aborted(
        mut self,
        callback: impl Fn(&Transaction, AbortReason) + Send + Sync + 'static,
    ) -> Self {
        self.on_aborted = Some(Box::new(callback));
        self
    }

    /// Wrap into the shared form the coordinator stores
    pub fn into_ref(self) -> Arc<Transaction> {
        Arc::new(self)
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        *self.status.lock()
    }

    /// Whether the transaction currently holds its lock
    pub fn is_active(&self) -> bool {
        matches!(self.status(), TransactionStatus::Active)
    }

    fn mark_active(&self) {
        let mut status = self.status.lock();
        if matches!(*status, TransactionStatus::Pending) {
            *status = TransactionStatus::Active;
        }
    }
}

impl CoordinatedTransaction for Transaction {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn database(&self) -> &DatabaseIdentity {
        &self.database
    }

    fn mode(&self) -> TransactionMode {
        self.mode
    }

    fn lock_acquired(&self) {
        self.mark_active();
        if let Some(callback) = &self.on_granted {
            callback(self);
        }
    }

    fn aborted(&self, reason: AbortReason) {
        {
            let mut status = self.status.lock();
            if status.is_finished() {
                return;
            }
            *status = TransactionStatus::Aborted { reason };
        }
        if let Some(callback) = &self.on_aborted {
            callback(self, reason);
        }
    }

    fn completed(&self, outcome: TransactionOutcome) {
        let mut status = self.status.lock();
        if status.is_finished() {
            return;
        }
        *status = match outcome {
            TransactionOutcome::Committed => TransactionStatus::Committed,
            TransactionOutcome::RolledBack => TransactionStatus::RolledBack,
            TransactionOutcome::Aborted(reason) => TransactionStatus::Aborted { reason },
        };
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("database", &self.database)
            .field("mode", &self.mode)
            .field("status", &self.status())
            .finish()
    }
}
