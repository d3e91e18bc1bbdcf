//! Error types for sqlworker
//!
//! This module defines the runtime error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Caller bugs (starting a worker twice, touching worker-only state from
//! another thread, signaling a synchronizer twice) are not represented here:
//! they are assertion failures at the call site.

use crate::types::TransactionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for sqlworker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a transaction was force-completed without an explicit commit or rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortReason {
    /// The worker thread is shutting down
    Shutdown,
    /// Termination was requested while the transaction was waiting for its lock
    TerminationRequested,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Shutdown => write!(f, "database thread shut down"),
            AbortReason::TerminationRequested => write!(f, "termination requested"),
        }
    }
}

/// Error types for sqlworker
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (config files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration could not be parsed or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transaction was force-completed by the coordinator
    #[error("Transaction {id} aborted: {reason}")]
    TransactionAborted {
        /// Aborted transaction
        id: TransactionId,
        /// Why it was aborted
        reason: AbortReason,
    },

    /// A transaction with this id is already known to the coordinator
    #[error("Transaction {0} is already registered with the coordinator")]
    DuplicateTransaction(TransactionId),

    /// The coordinator has no record of this transaction
    #[error("Transaction {0} is not known to the coordinator")]
    UnknownTransaction(TransactionId),

    /// A task reported a failure
    #[error("Task failed: {0}")]
    Task(String),
}

impl Error {
    /// Create a task failure error
    pub fn task(message: impl Into<String>) -> Self {
        Error::Task(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// True if this error reports a coordinator-forced abort
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::TransactionAborted { .. })
    }
}
