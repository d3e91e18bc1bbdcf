//! The database thread
//!
//! One `DatabaseThread` owns one OS thread that executes every storage task
//! of the databases it serves, strictly in submission order.
//!
//! ## Lifecycle
//!
//! ```text
//! NotStarted --start()--> Running --request_termination()--> TerminationRequested
//!                                                                   |
//!                                        shutdown task reaches the worker
//!                                                                   v
//!                                                              Terminated
//! ```
//!
//! ## Shutdown sequence (on the worker)
//!
//! 1. Close the queue; tasks still queued are dropped, their synchronizers signaled
//! 2. Shut down the transaction coordinator (abort pending and active transactions)
//! 3. Empty the open-database registry and close each live handle once
//! 4. Signal every cleanup synchronizer handed to `request_termination`
//! 5. Release the thread handle and exit
//!
//! Registry access is restricted to the worker thread and asserted.

mod builder;
mod config;
mod registry;

pub use builder::DatabaseThreadBuilder;
pub use config::{WorkerConfig, CONFIG_FILE_NAME, MIN_STACK_SIZE};
pub use registry::{DatabaseHandle, DatabaseHandleRef, OpenDatabaseRegistry};

use crate::client::TransactionClient;
use crate::queue::TaskQueue;
use crate::task::Task;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use sqlworker_concurrency::{CoordinatedTransaction, TaskSynchronizer, TransactionCoordinator};
use sqlworker_core::{Result, TransactionMode, TransactionOutcome};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a [`DatabaseThread`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, `start` not called yet
    NotStarted,
    /// Processing tasks
    Running,
    /// Shutdown task queued, worker still running
    TerminationRequested,
    /// Shutdown sequence finished
    Terminated,
}

/// Worker metrics snapshot.
///
/// Every scheduled task ends in exactly one of completed, failed, panicked
/// or dropped, so `tasks_scheduled` equals their sum once the queue is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    /// Current lifecycle state.
    pub state: WorkerState,
    /// Calls to `schedule`, including tasks that were dropped.
    pub tasks_scheduled: u64,
    /// Tasks that ran and returned `Ok`.
    pub tasks_completed: u64,
    /// Tasks that ran and returned `Err`.
    pub tasks_failed: u64,
    /// Tasks that panicked.
    pub tasks_panicked: u64,
    /// Tasks discarded because the thread was terminating.
    pub tasks_dropped: u64,
    /// Tasks waiting in the queue.
    pub queue_depth: usize,
    /// Handles recorded in the open-database registry.
    pub open_databases: usize,
}

enum Envelope {
    Run(Task),
    Shutdown,
}

struct Lifecycle {
    state: WorkerState,
    cleanup_syncs: Vec<Arc<TaskSynchronizer>>,
}

#[derive(Default)]
struct TaskCounters {
    scheduled: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    dropped: AtomicU64,
}

struct Shared {
    config: WorkerConfig,
    queue: TaskQueue<Envelope>,
    lifecycle: Mutex<Lifecycle>,
    termination_requested: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: OnceCell<ThreadId>,
    registry: Mutex<OpenDatabaseRegistry>,
    coordinator: TransactionCoordinator,
    client: Arc<dyn TransactionClient>,
    counters: TaskCounters,
}

/// Dedicated worker thread serializing database tasks
///
/// Cheap to clone; every clone refers to the same worker. Tasks receive a
/// reference to it so they can reach the registry, the coordinator and the
/// transaction client.
#[derive(Clone)]
pub struct DatabaseThread {
    shared: Arc<Shared>,
}

impl DatabaseThread {
    /// Create a thread with default configuration, in the NotStarted state
    pub fn create() -> Self {
        Self::builder().build()
    }

    /// Builder for custom configuration
    pub fn builder() -> DatabaseThreadBuilder {
        DatabaseThreadBuilder::new()
    }

    pub(crate) fn with_parts(config: WorkerConfig, client: Arc<dyn TransactionClient>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                queue: TaskQueue::new(),
                lifecycle: Mutex::new(Lifecycle {
                    state: WorkerState::NotStarted,
                    cleanup_syncs: Vec::new(),
                }),
                termination_requested: AtomicBool::new(false),
                thread: Mutex::new(None),
                thread_id: OnceCell::new(),
                registry: Mutex::new(OpenDatabaseRegistry::new()),
                coordinator: TransactionCoordinator::new(),
                client,
                counters: TaskCounters::default(),
            }),
        }
    }

    /// Spawn the worker and start processing tasks
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the OS refuses to
    /// spawn the thread. The thread stays NotStarted in that case.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.shared.lifecycle.lock();
        assert_eq!(
            lifecycle.state,
            WorkerState::NotStarted,
            "DatabaseThread::start called twice"
        );
        self.shared.config.validate()?;

        let mut builder = thread::Builder::new().name(self.shared.config.thread_name.clone());
        if let Some(size) = self.shared.config.stack_size {
            builder = builder.stack_size(size);
        }

        // Hold the handle slot while spawning so the worker cannot release
        // it before it is stored.
        let mut slot = self.shared.thread.lock();
        let worker = self.clone();
        let handle = builder.spawn(move || worker.run_loop())?;
        *slot = Some(handle);
        lifecycle.state = WorkerState::Running;

        info!(
            target: "sqlworker::thread",
            name = %self.shared.config.thread_name,
            "Database thread started"
        );
        Ok(())
    }

    /// Queue `task` for execution on the worker
    ///
    /// Never blocks. Once termination has been requested the task is dropped
    /// silently; its synchronizer, if any, is signaled so no waiter hangs.
    ///
    /// # Panics
    ///
    /// Panics if called before [`start`](Self::start).
    pub fn schedule(&self, task: Task) {
        assert_ne!(
            self.state(),
            WorkerState::NotStarted,
            "DatabaseThread::schedule called before start"
        );
        self.shared.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        if self.shared.termination_requested.load(Ordering::Acquire) {
            self.drop_task(task);
            return;
        }
        match self.shared.queue.push(Envelope::Run(task)) {
            Ok(()) => {}
            Err(Envelope::Run(task)) => self.drop_task(task),
            Err(Envelope::Shutdown) => {}
        }
    }

    /// Queue `task` and block until it has run or been dropped
    ///
    /// Any synchronizer already attached to `task` is replaced.
    ///
    /// # Panics
    ///
    /// Panics if called on the database thread itself, where waiting would
    /// deadlock.
    pub fn schedule_and_wait(&self, task: Task) {
        assert!(
            !self.is_database_thread(),
            "schedule_and_wait called on the database thread"
        );
        let sync = Arc::new(TaskSynchronizer::new());
        self.schedule(task.with_synchronizer(Arc::clone(&sync)));
        sync.wait();
    }

    /// Ask the worker to shut down
    ///
    /// Callable from any thread. The first call interrupts tasks blocked on
    /// a lock and queues the shutdown task. Later calls do not start a second
    /// shutdown: their synchronizer is signaled together with the first one,
    /// or immediately if the shutdown already finished.
    ///
    /// # Panics
    ///
    /// Panics if called before [`start`](Self::start).
    pub fn request_termination(&self, cleanup_sync: Option<Arc<TaskSynchronizer>>) {
        let mut lifecycle = self.shared.lifecycle.lock();
        let state = lifecycle.state;
        match state {
            WorkerState::NotStarted => {
                panic!("DatabaseThread::request_termination called before start")
            }
            WorkerState::Running => {
                lifecycle.state = WorkerState::TerminationRequested;
                lifecycle.cleanup_syncs.extend(cleanup_sync);
                self.shared
                    .termination_requested
                    .store(true, Ordering::Release);
                drop(lifecycle);

                self.shared.coordinator.interrupt();
                // The queue is only killed by the worker after it sees this
                // envelope, so the push cannot fail.
                let _ = self.shared.queue.push(Envelope::Shutdown);
                info!(target: "sqlworker::thread", "Database thread termination requested");
            }
            WorkerState::TerminationRequested => {
                if let Some(sync) = cleanup_sync {
                    if !lifecycle
                        .cleanup_syncs
                        .iter()
                        .any(|s| Arc::ptr_eq(s, &sync))
                    {
                        lifecycle.cleanup_syncs.push(sync);
                    }
                }
                debug!(target: "sqlworker::thread", "Termination already in progress");
            }
            WorkerState::Terminated => {
                drop(lifecycle);
                if let Some(sync) = cleanup_sync {
                    sync.try_signal();
                }
                debug!(target: "sqlworker::thread", "Termination already complete");
            }
        }
    }

    /// Whether termination has been requested
    ///
    /// Long-running tasks poll this to stop early. A task passing its own
    /// synchronizer records on it that it checked, see
    /// [`TaskSynchronizer::has_checked_for_termination`].
    pub fn termination_requested(&self, task_sync: Option<&TaskSynchronizer>) -> bool {
        if let Some(sync) = task_sync {
            sync.set_has_checked_for_termination();
        }
        self.shared.termination_requested.load(Ordering::Acquire)
    }

    /// Whether the caller is running on the worker thread
    pub fn is_database_thread(&self) -> bool {
        self.shared
            .thread_id
            .get()
            .map(|id| *id == thread::current().id())
            .unwrap_or(false)
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        self.shared.lifecycle.lock().state
    }

    /// Record `handle` as open on this thread
    ///
    /// # Panics
    ///
    /// Panics when called off the database thread.
    pub fn record_database_open(&self, handle: &DatabaseHandleRef) {
        self.assert_database_thread("record_database_open");
        if self.shared.registry.lock().record_open(handle) {
            debug!(
                target: "sqlworker::registry",
                handle = %handle.handle_id(),
                database = %handle.identity(),
                "Database opened"
            );
        }
    }

    /// Forget `handle`
    ///
    /// # Panics
    ///
    /// Panics when called off the database thread.
    pub fn record_database_closed(&self, handle: &DatabaseHandleRef) {
        self.assert_database_thread("record_database_closed");
        if self.shared.registry.lock().record_closed(handle) {
            debug!(
                target: "sqlworker::registry",
                handle = %handle.handle_id(),
                database = %handle.identity(),
                "Database closed"
            );
        }
    }

    /// Whether `handle` is recorded as open
    ///
    /// # Panics
    ///
    /// Panics when called off the database thread.
    pub fn is_database_open(&self, handle: &DatabaseHandleRef) -> bool {
        self.assert_database_thread("is_database_open");
        self.shared.registry.lock().is_open(handle)
    }

    /// Remove `handle` from the registry and close it
    ///
    /// Returns `false`, without closing, if the handle was not recorded. A
    /// handle is therefore closed at most once however often this is called.
    ///
    /// # Panics
    ///
    /// Panics when called off the database thread.
    pub fn close_database(&self, handle: &DatabaseHandleRef) -> bool {
        self.assert_database_thread("close_database");
        let removed = self.shared.registry.lock().record_closed(handle);
        if removed {
            handle.close_immediately();
            debug!(
                target: "sqlworker::registry",
                handle = %handle.handle_id(),
                database = %handle.identity(),
                "Database closed immediately"
            );
        }
        removed
    }

    /// Finish `txn`: notify the transaction client, then release its lock
    ///
    /// Runs on the worker after the storage backend has committed or rolled
    /// back. Waiters granted by the release are notified before this returns.
    ///
    /// # Panics
    ///
    /// Panics when called off the database thread.
    pub fn complete_transaction(
        &self,
        txn: &dyn CoordinatedTransaction,
        outcome: TransactionOutcome,
    ) -> Result<()> {
        self.assert_database_thread("complete_transaction");
        txn.completed(outcome);

        let client = &self.shared.client;
        if outcome.is_committed() && txn.mode() == TransactionMode::ReadWrite {
            client.did_commit_write_transaction(txn.database());
        }
        client.did_complete_transaction(txn.database(), txn.mode(), outcome);

        self.shared.coordinator.release_lock(txn)
    }

    /// Transaction client notified on completion
    pub fn transaction_client(&self) -> &Arc<dyn TransactionClient> {
        &self.shared.client
    }

    /// Coordinator arbitrating database locks for this thread's tasks
    pub fn transaction_coordinator(&self) -> &TransactionCoordinator {
        &self.shared.coordinator
    }

    /// Configuration the thread was built with
    pub fn config(&self) -> &WorkerConfig {
        &self.shared.config
    }

    /// Return a snapshot of worker metrics.
    pub fn stats(&self) -> WorkerStats {
        let counters = &self.shared.counters;
        WorkerStats {
            state: self.state(),
            tasks_scheduled: counters.scheduled.load(Ordering::Relaxed),
            tasks_completed: counters.completed.load(Ordering::Relaxed),
            tasks_failed: counters.failed.load(Ordering::Relaxed),
            tasks_panicked: counters.panicked.load(Ordering::Relaxed),
            tasks_dropped: counters.dropped.load(Ordering::Relaxed),
            queue_depth: self.shared.queue.len(),
            open_databases: self.shared.registry.lock().len(),
        }
    }

    fn assert_database_thread(&self, operation: &str) {
        assert!(
            self.is_database_thread(),
            "{} must be called on the database thread",
            operation
        );
    }

    fn drop_task(&self, task: Task) {
        self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "sqlworker::thread",
            task = %task.name(),
            "Task dropped, database thread is terminating"
        );
        if let Some(sync) = task.synchronizer() {
            sync.try_signal();
        }
    }

    fn run_loop(self) {
        let _ = self.shared.thread_id.set(thread::current().id());
        debug!(target: "sqlworker::thread", "Worker loop entered");

        while let Some(envelope) = self.shared.queue.take() {
            match envelope {
                Envelope::Run(task) => self.run_task(task),
                Envelope::Shutdown => break,
            }
        }

        self.cleanup();
    }

    fn run_task(&self, task: Task) {
        let (name, work, sync) = task.into_parts();
        let started = Instant::now();

        // catch_unwind keeps a panicking task from killing the worker loop.
        match panic::catch_unwind(AssertUnwindSafe(|| work(self))) {
            Ok(Ok(())) => {
                self.shared.counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                self.shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "sqlworker::thread",
                    task = %name,
                    error = %e,
                    "Database task failed"
                );
            }
            Err(payload) => {
                self.shared.counters.panicked.fetch_add(1, Ordering::Relaxed);
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "(non-string panic)".to_string());
                error!(
                    target: "sqlworker::thread",
                    task = %name,
                    "Database task panicked: {}",
                    message
                );
            }
        }

        if let Some(threshold) = self.shared.config.slow_task_threshold() {
            let elapsed = started.elapsed();
            if elapsed > threshold {
                warn!(
                    target: "sqlworker::thread",
                    task = %name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Slow database task"
                );
            }
        }

        if let Some(sync) = sync {
            sync.try_signal();
        }
    }

    fn cleanup(&self) {
        for envelope in self.shared.queue.kill() {
            if let Envelope::Run(task) = envelope {
                self.drop_task(task);
            }
        }

        let aborted = self.shared.coordinator.shutdown();

        // Removal from the registry precedes close, so each handle closes once.
        let handles = self.shared.registry.lock().take_all();
        for handle in &handles {
            handle.close_immediately();
        }

        let syncs = {
            let mut lifecycle = self.shared.lifecycle.lock();
            lifecycle.state = WorkerState::Terminated;
            std::mem::take(&mut lifecycle.cleanup_syncs)
        };

        info!(
            target: "sqlworker::thread",
            aborted_transactions = aborted,
            closed_databases = handles.len(),
            "Database thread terminated"
        );

        for sync in &syncs {
            sync.try_signal();
        }

        // Dropping our own JoinHandle detaches the thread; it exits right after.
        self.shared.thread.lock().take();
    }
}
