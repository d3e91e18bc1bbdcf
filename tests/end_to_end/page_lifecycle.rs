//! Page Lifecycle Tests
//!
//! A page opens databases through the worker, uses them, and is torn down
//! while handles are still open.

use crate::common::*;
use parking_lot::Mutex;
use sqlworker::{Task, WorkerState};
use std::collections::BTreeMap;
use std::sync::Arc;

#[test]
fn open_use_and_teardown() {
    let thread = start_thread();
    let store: Store = Arc::new(Mutex::new(BTreeMap::new()));
    let notes = MemoryHandle::open(identity("notes"), &store);
    let cache = MemoryHandle::open(identity("cache"), &store);

    let (n, c) = (notes.handle_ref(), cache.handle_ref());
    thread.schedule_and_wait(Task::new("open databases", move |t| {
        t.record_database_open(&n);
        t.record_database_open(&c);
        Ok(())
    }));

    let n = Arc::clone(&notes);
    thread.schedule_and_wait(Task::new("write note", move |_| {
        n.put("title", "groceries");
        n.commit();
        Ok(())
    }));
    assert_eq!(notes.get("title").as_deref(), Some("groceries"));
    assert_eq!(thread.stats().open_databases, 2);

    shut_down(&thread);

    assert_eq!(thread.state(), WorkerState::Terminated);
    assert!(notes.is_closed());
    assert!(cache.is_closed());
    assert_eq!(notes.close_count(), 1);
    assert_eq!(cache.close_count(), 1);
    assert_eq!(thread.stats().open_databases, 0);
}

#[test]
fn uncommitted_work_is_rolled_back_on_teardown() {
    let thread = start_thread();
    let store: Store = Arc::new(Mutex::new(BTreeMap::new()));
    let handle = MemoryHandle::open(identity("drafts"), &store);

    let h = Arc::clone(&handle);
    thread.schedule_and_wait(Task::new("half-done write", move |t| {
        t.record_database_open(&h.handle_ref());
        h.put("draft", "unsaved");
        Ok(())
    }));

    shut_down(&thread);
    handle.commit();
    assert_eq!(handle.get("draft"), None);
}

#[test]
fn closed_handle_is_not_closed_again_at_teardown() {
    let thread = start_thread();
    let store: Store = Arc::new(Mutex::new(BTreeMap::new()));
    let handle = MemoryHandle::open(identity("notes"), &store);

    let h = handle.handle_ref();
    thread.schedule_and_wait(Task::new("open and close", move |t| {
        t.record_database_open(&h);
        assert!(t.is_database_open(&h));
        assert!(t.close_database(&h));
        assert!(!t.is_database_open(&h));
        Ok(())
    }));

    shut_down(&thread);
    assert_eq!(handle.close_count(), 1);
}

#[test]
fn handles_released_by_their_owner_are_ignored() {
    let thread = start_thread();
    let store: Store = Arc::new(Mutex::new(BTreeMap::new()));

    thread.schedule_and_wait(Task::new("open temporary", move |t| {
        let temp = MemoryHandle::open(identity("temp"), &store);
        t.record_database_open(&temp.handle_ref());
        Ok(())
    }));
    assert_eq!(thread.stats().open_databases, 1);

    shut_down(&thread);
    assert_eq!(thread.stats().open_databases, 0);
}

#[test]
fn long_task_observes_termination_request() {
    let thread = start_thread();
    let iterations = Arc::new(Mutex::new(0u64));
    let started = Arc::new(sqlworker::TaskSynchronizer::new());

    let (i, s) = (Arc::clone(&iterations), Arc::clone(&started));
    let task_sync = Arc::new(sqlworker::TaskSynchronizer::new());
    let ts = Arc::clone(&task_sync);
    thread.schedule(
        Task::new("vacuum", move |t| {
            s.signal();
            while !t.termination_requested(Some(&ts)) {
                *i.lock() += 1;
                std::thread::yield_now();
            }
            Ok(())
        })
        .with_synchronizer(Arc::clone(&task_sync)),
    );

    started.wait();
    shut_down(&thread);
    assert!(task_sync.is_signaled());
    assert!(task_sync.has_checked_for_termination());
}
