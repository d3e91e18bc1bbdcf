//! Configuration Tests
//!
//! Threads built from a `sqlworker.toml` on disk.

use crate::common::*;
use sqlworker::{DatabaseThread, Task, WorkerConfig, WorkerState};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn thread_built_from_config_file() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(sqlworker::CONFIG_FILE_NAME);
    std::fs::write(
        &path,
        "thread_name = \"page-42-db\"\nstack_size = 1048576\nslow_task_threshold_ms = 0\n",
    )
    .unwrap();

    let config = WorkerConfig::from_file(&path).unwrap();
    let thread = DatabaseThread::builder().config(config).build();
    thread.start().unwrap();

    let name = Arc::new(parking_lot::Mutex::new(String::new()));
    let n = Arc::clone(&name);
    thread.schedule_and_wait(Task::new("which thread", move |_| {
        *n.lock() = std::thread::current().name().unwrap_or_default().to_string();
        Ok(())
    }));
    assert_eq!(*name.lock(), "page-42-db");
    assert_eq!(thread.config().slow_task_threshold(), None);

    shut_down(&thread);
}

#[test]
fn default_config_written_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sqlworker.toml");

    WorkerConfig::write_default_if_missing(&path).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    WorkerConfig::write_default_if_missing(&path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), written);

    assert_eq!(WorkerConfig::from_file(&path).unwrap(), WorkerConfig::default());
}

#[test]
fn bad_config_keeps_thread_stopped() {
    let config = WorkerConfig {
        stack_size: Some(16),
        ..WorkerConfig::default()
    };
    let thread = DatabaseThread::builder().config(config).build();
    assert!(thread.start().is_err());
    assert_eq!(thread.state(), WorkerState::NotStarted);
}
