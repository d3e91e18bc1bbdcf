//! Transaction client hook
//!
//! The database thread calls the client after a transaction's storage work
//! has finished and before its lock is released, so observers see the state
//! the transaction left behind. Implementations run on the worker thread and
//! must not call back into the coordinator.

use sqlworker_core::{DatabaseIdentity, TransactionMode, TransactionOutcome};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Receives transaction side-effect notifications
pub trait TransactionClient: Send + Sync {
    /// A read-write transaction committed on `database`
    fn did_commit_write_transaction(&self, database: &DatabaseIdentity);

    /// Any transaction on `database` finished with `outcome`
    fn did_complete_transaction(
        &self,
        _database: &DatabaseIdentity,
        _mode: TransactionMode,
        _outcome: TransactionOutcome,
    ) {
    }
}

/// Default client: logs every notification and counts them
#[derive(Debug, Default)]
pub struct LoggingTransactionClient {
    write_commits: AtomicU64,
    completions: AtomicU64,
}

impl LoggingTransactionClient {
    /// Create a client with zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed read-write transactions seen
    pub fn write_commits(&self) -> u64 {
        self.write_commits.load(Ordering::Relaxed)
    }

    /// Number of completed transactions seen
    pub fn completions(&self) -> u64 {
        self.completions.load(Ordering::Relaxed)
    }
}

impl TransactionClient for LoggingTransactionClient {
    fn did_commit_write_transaction(&self, database: &DatabaseIdentity) {
        self.write_commits.fetch_add(1, Ordering::Relaxed);
        debug!(target: "sqlworker::client", database = %database, "Write transaction committed");
    }

    fn did_complete_transaction(
        &self,
        database: &DatabaseIdentity,
        mode: TransactionMode,
        outcome: TransactionOutcome,
    ) {
        self.completions.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "sqlworker::client",
            database = %database,
            mode = %mode,
            outcome = %outcome,
            "Transaction completed"
        );
    }
}
