//! Worker configuration via `sqlworker.toml`
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration.

use serde::{Deserialize, Serialize};
use sqlworker_core::{Error, Result};
use std::path::Path;
use std::time::Duration;

/// Config file name looked up next to the database files.
pub const CONFIG_FILE_NAME: &str = "sqlworker.toml";

/// Smallest stack size accepted for the worker thread.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Database thread configuration loaded from `sqlworker.toml`.
///
/// # Example
///
/// ```toml
/// thread_name = "sqlworker-db"
/// slow_task_threshold_ms = 500
/// # stack_size = 1048576
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name given to the worker thread.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
    /// Worker stack size in bytes. Platform default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_size: Option<usize>,
    /// Tasks running longer than this are logged as slow. 0 disables.
    #[serde(default = "default_slow_task_threshold_ms")]
    pub slow_task_threshold_ms: u64,
}

fn default_thread_name() -> String {
    "sqlworker-db".to_string()
}

fn default_slow_task_threshold_ms() -> u64 {
    500
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            stack_size: None,
            slow_task_threshold_ms: default_slow_task_threshold_ms(),
        }
    }
}

impl WorkerConfig {
    /// Slow-task threshold, `None` when disabled.
    pub fn slow_task_threshold(&self) -> Option<Duration> {
        match self.slow_task_threshold_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Check field values.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread name is empty or contains a NUL byte,
    /// or if the stack size is below [`MIN_STACK_SIZE`].
    pub fn validate(&self) -> Result<()> {
        if self.thread_name.is_empty() {
            return Err(Error::config("thread_name must not be empty"));
        }
        if self.thread_name.contains('\0') {
            return Err(Error::config("thread_name must not contain NUL bytes"));
        }
        if let Some(size) = self.stack_size {
            if size < MIN_STACK_SIZE {
                return Err(Error::config(format!(
                    "stack_size {} is below the minimum of {} bytes",
                    size, MIN_STACK_SIZE
                )));
            }
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: WorkerConfig = toml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# sqlworker database thread configuration
#
# Name of the worker thread (shows up in debuggers and panic messages)
thread_name = "sqlworker-db"

# Log a warning for tasks running longer than this many milliseconds.
# 0 disables the check.
slow_task_threshold_ms = 500

# Worker stack size in bytes (default: platform default)
# stack_size = 1048576
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
