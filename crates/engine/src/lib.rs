//! Database thread for sqlworker
//!
//! This crate runs every storage operation of an in-page database on one
//! dedicated worker thread:
//! - TaskQueue: FIFO hand-off from producer threads to the worker
//! - DatabaseThread: Worker lifecycle (start, schedule, graceful termination)
//! - OpenDatabaseRegistry: Handles currently in use on the worker
//! - TransactionClient: Side-effect hook run when a transaction completes
//! - WorkerConfig: Settings loaded from `sqlworker.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod database_thread;
pub mod queue;
pub mod task;

pub use client::{LoggingTransactionClient, TransactionClient};
pub use database_thread::{
    DatabaseHandle, DatabaseHandleRef, DatabaseThread, DatabaseThreadBuilder,
    OpenDatabaseRegistry, WorkerConfig, WorkerState, WorkerStats, CONFIG_FILE_NAME,
};
pub use queue::TaskQueue;
pub use task::Task;
