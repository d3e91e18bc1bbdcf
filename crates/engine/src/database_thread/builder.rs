//! Builder for database thread configuration

use std::sync::Arc;

use super::{DatabaseThread, WorkerConfig};
use crate::client::{LoggingTransactionClient, TransactionClient};

// ============================================================================
// Database Thread Builder
// ============================================================================

/// Builder for [`DatabaseThread`]
///
/// ```ignore
/// use sqlworker_engine::{DatabaseThread, WorkerConfig};
///
/// // Defaults: thread "sqlworker-db", logging transaction client
/// let thread = DatabaseThread::create();
///
/// // Custom config and client
/// let thread = DatabaseThread::builder()
///     .config(WorkerConfig::from_file(path)?)
///     .transaction_client(Arc::new(MyClient::default()))
///     .build();
/// thread.start()?;
/// ```
#[derive(Clone)]
pub struct DatabaseThreadBuilder {
    config: WorkerConfig,
    client: Option<Arc<dyn TransactionClient>>,
}

impl DatabaseThreadBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self {
            config: WorkerConfig::default(),
            client: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the worker thread name
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Set the worker stack size in bytes
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    /// Install the transaction client notified on completion
    ///
    /// Defaults to [`LoggingTransactionClient`].
    pub fn transaction_client(mut self, client: Arc<dyn TransactionClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Create the thread in the NotStarted state
    pub fn build(self) -> DatabaseThread {
        let client = self
            .client
            .unwrap_or_else(|| Arc::new(LoggingTransactionClient::new()));
        DatabaseThread::with_parts(self.config, client)
    }
}

impl Default for DatabaseThreadBuilder {
    fn default() -> Self {
        Self::new()
    }
}
