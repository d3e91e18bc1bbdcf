//! Core types for sqlworker
//!
//! This module defines the foundational types:
//! - DatabaseIdentity: Stable key for one logical database (origin + name)
//! - HandleId: Identifies one open connection to a database
//! - TransactionId: Identifies one transaction
//! - TransactionMode: Lock mode a transaction asks the coordinator for
//! - TransactionOutcome: How a transaction finished

use crate::error::AbortReason;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Stable key identifying one logical database
///
/// Every handle opened on the same origin and name resolves to an equal
/// identity, so the coordinator groups their transactions together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatabaseIdentity {
    origin: String,
    name: String,
}

impl DatabaseIdentity {
    /// Create an identity for `name` opened by `origin`
    pub fn new(origin: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            name: name.into(),
        }
    }

    /// Origin that owns the database
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Database name within the origin
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DatabaseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.origin, self.name)
    }
}

/// Process-unique identifier of one open database connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(u64);

impl HandleId {
    /// Allocate the next handle id
    pub fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "db-{}", self.0)
    }
}

/// Process-unique identifier of one transaction
///
/// Ids are allocated in increasing order, so comparing two ids tells which
/// transaction was created first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Allocate the next transaction id
    pub fn next() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw id (tests and diagnostics)
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Lock mode requested by a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionMode {
    /// Shares the database with other read-only transactions
    ReadOnly,
    /// Requires exclusive access to the database
    ReadWrite,
}

impl TransactionMode {
    /// True for `ReadOnly`
    pub fn is_read_only(&self) -> bool {
        matches!(self, TransactionMode::ReadOnly)
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionMode::ReadOnly => write!(f, "read-only"),
            TransactionMode::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// How a transaction finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOutcome {
    /// Work was committed by the storage backend
    Committed,
    /// Work was rolled back by the storage backend
    RolledBack,
    /// The coordinator force-completed the transaction
    Aborted(AbortReason),
}

impl TransactionOutcome {
    /// True for `Committed`
    pub fn is_committed(&self) -> bool {
        matches!(self, TransactionOutcome::Committed)
    }
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionOutcome::Committed => write!(f, "committed"),
            TransactionOutcome::RolledBack => write!(f, "rolled back"),
            TransactionOutcome::Aborted(reason) => write!(f, "aborted ({})", reason),
        }
    }
}
