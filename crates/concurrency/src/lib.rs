//! Concurrency layer for sqlworker
//!
//! This crate implements the lock arbitration used by the database thread:
//! - TransactionCoordinator: Per-database read/write lock grants with FIFO waiters
//! - Transaction: Default transaction type tracking its lock status
//! - TaskSynchronizer: One-shot completion signal
//!
//! Nothing here spawns threads. The coordinator is driven by whichever thread
//! executes database tasks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod synchronizer;
pub mod transaction;

pub use coordinator::{CoordinatorMetrics, LockGrant, LockSnapshot, TransactionCoordinator};
pub use synchronizer::TaskSynchronizer;
pub use transaction::{CoordinatedTransaction, Transaction, TransactionRef, TransactionStatus};
