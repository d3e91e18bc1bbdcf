//! Transaction Tests
//!
//! Transactions run on the worker against in-memory handles, with the
//! coordinator deciding who may touch each database.

use crate::common::*;
use parking_lot::Mutex;
use sqlworker::{
    AbortReason, DatabaseHandle, DatabaseThread, LockGrant, LoggingTransactionClient, Task,
    Transaction, TransactionOutcome, TransactionStatus,
};
use std::collections::BTreeMap;
use std::sync::Arc;

fn thread_with_client() -> (DatabaseThread, Arc<LoggingTransactionClient>) {
    init_tracing();
    let client = Arc::new(LoggingTransactionClient::new());
    let thread = DatabaseThread::builder()
        .transaction_client(client.clone())
        .build();
    thread.start().unwrap();
    (thread, client)
}

#[test]
fn committed_writes_reach_the_client() {
    let (thread, client) = thread_with_client();
    let store: Store = Arc::new(Mutex::new(BTreeMap::new()));
    let handle = MemoryHandle::open(identity("notes"), &store);

    for i in 0..3 {
        let h = Arc::clone(&handle);
        thread.schedule_and_wait(Task::new("write", move |t| {
            let txn = Transaction::read_write(h.identity().clone()).into_ref();
            t.transaction_coordinator().acquire_lock(txn.clone())?;
            h.put("counter", &i.to_string());
            h.commit();
            t.complete_transaction(&*txn, TransactionOutcome::Committed)
        }));
    }
    let h = Arc::clone(&handle);
    thread.schedule_and_wait(Task::new("read", move |t| {
        let txn = Transaction::read_only(h.identity().clone()).into_ref();
        t.transaction_coordinator().acquire_lock(txn.clone())?;
        t.complete_transaction(&*txn, TransactionOutcome::Committed)
    }));

    assert_eq!(handle.get("counter").as_deref(), Some("2"));
    assert_eq!(client.write_commits(), 3);
    assert_eq!(client.completions(), 4);
    assert_eq!(thread.transaction_coordinator().database_count(), 0);
    shut_down(&thread);
}

#[test]
fn writer_waits_for_readers_then_runs() {
    let (thread, client) = thread_with_client();
    let events = Arc::new(Mutex::new(Vec::new()));
    let db = identity("shared");

    let readers: Vec<_> = (0..2)
        .map(|n| {
            let e = Arc::clone(&events);
            Transaction::read_only(db.clone())
                .on_granted(move |_| e.lock().push(format!("reader{}-granted", n)))
                .into_ref()
        })
        .collect();
    let e = Arc::clone(&events);
    let writer = Transaction::read_write(db.clone())
        .on_granted(move |_| e.lock().push("writer-granted".to_string()))
        .into_ref();

    let (r, w) = (readers.clone(), writer.clone());
    thread.schedule_and_wait(Task::new("contend", move |t| {
        let coord = t.transaction_coordinator();
        for reader in &r {
            assert_eq!(coord.acquire_lock(reader.clone())?, LockGrant::Granted);
        }
        assert_eq!(coord.acquire_lock(w.clone())?, LockGrant::Queued { position: 0 });
        for reader in &r {
            t.complete_transaction(&**reader, TransactionOutcome::Committed)?;
        }
        t.complete_transaction(&*w, TransactionOutcome::Committed)
    }));

    assert_eq!(
        *events.lock(),
        vec!["reader0-granted", "reader1-granted", "writer-granted"]
    );
    assert_eq!(writer.status(), TransactionStatus::Committed);
    assert_eq!(client.write_commits(), 1);
    shut_down(&thread);
}

#[test]
fn teardown_aborts_transactions_left_open() {
    let (thread, client) = thread_with_client();
    let aborted = Arc::new(Mutex::new(Vec::new()));
    let db = identity("notes");

    let a = Arc::clone(&aborted);
    let open_txn = Transaction::read_write(db.clone())
        .on_aborted(move |txn, reason| a.lock().push((txn.status(), reason)))
        .into_ref();

    let t2 = open_txn.clone();
    thread.schedule_and_wait(Task::new("begin", move |t| {
        t.transaction_coordinator().acquire_lock(t2)?;
        Ok(())
    }));
    assert!(open_txn.is_active());

    shut_down(&thread);

    let aborted = aborted.lock();
    assert_eq!(aborted.len(), 1);
    assert_eq!(aborted[0].1, AbortReason::Shutdown);
    assert_eq!(client.completions(), 0);
    assert!(thread.transaction_coordinator().metrics().aborted >= 1);
}
