//! Units of work executed on the database thread

use crate::database_thread::DatabaseThread;
use sqlworker_concurrency::TaskSynchronizer;
use sqlworker_core::Result;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

type TaskFn = Box<dyn FnOnce(&DatabaseThread) -> Result<()> + Send>;

/// One unit of work for the database thread
///
/// The closure runs exactly once, on the worker, and receives the thread so
/// it can reach the registry, the coordinator and the transaction client.
/// An attached synchronizer is signaled after the closure returns, or when
/// the task is dropped because the thread is terminating.
pub struct Task {
    name: Cow<'static, str>,
    work: TaskFn,
    synchronizer: Option<Arc<TaskSynchronizer>>,
}

impl Task {
    /// Create a task named `name` running `work`
    pub fn new<F>(name: impl Into<Cow<'static, str>>, work: F) -> Self
    where
        F: FnOnce(&DatabaseThread) -> Result<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            work: Box::new(work),
            synchronizer: None,
        }
    }

    /// Signal `synchronizer` once this task has run or been dropped
    ///
    /// Replaces any synchronizer attached earlier.
    pub fn with_synchronizer(mut self, synchronizer: Arc<TaskSynchronizer>) -> Self {
        self.synchronizer = Some(synchronizer);
        self
    }

    /// Name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attached completion synchronizer
    pub fn synchronizer(&self) -> Option<&Arc<TaskSynchronizer>> {
        self.synchronizer.as_ref()
    }

    pub(crate) fn into_parts(self) -> (Cow<'static, str>, TaskFn, Option<Arc<TaskSynchronizer>>) {
        (self.name, self.work, self.synchronizer)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("has_synchronizer", &self.synchronizer.is_some())
            .finish()
    }
}
