//! sqlworker - Dedicated database thread for in-page databases
//!
//! Every storage operation for the databases of one page runs on a single
//! worker thread. Other threads hand work over as [`Task`]s and may wait for
//! completion; transactions on the same database are arbitrated by the
//! [`TransactionCoordinator`] so readers share and writers exclude.
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlworker::{DatabaseThread, Task, TaskSynchronizer};
//! use std::sync::Arc;
//!
//! let thread = DatabaseThread::create();
//! thread.start()?;
//!
//! thread.schedule_and_wait(Task::new("open", |t| {
//!     t.record_database_open(&handle);
//!     Ok(())
//! }));
//!
//! let done = Arc::new(TaskSynchronizer::new());
//! thread.request_termination(Some(done.clone()));
//! done.wait();
//! ```
//!
//! # Architecture
//!
//! - `sqlworker-core`: identities, transaction modes and the error type
//! - `sqlworker-concurrency`: lock coordination and task synchronizers
//! - `sqlworker-engine`: the worker thread, its queue and its registry

pub use sqlworker_concurrency::{
    CoordinatedTransaction, CoordinatorMetrics, LockGrant, LockSnapshot, TaskSynchronizer,
    Transaction, TransactionCoordinator, TransactionRef, TransactionStatus,
};
pub use sqlworker_core::{
    AbortReason, DatabaseIdentity, Error, HandleId, Result, TransactionId, TransactionMode,
    TransactionOutcome,
};
pub use sqlworker_engine::{
    DatabaseHandle, DatabaseHandleRef, DatabaseThread, DatabaseThreadBuilder,
    LoggingTransactionClient, OpenDatabaseRegistry, Task, TaskQueue, TransactionClient,
    WorkerConfig, WorkerState, WorkerStats, CONFIG_FILE_NAME,
};
