//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use parking_lot::Mutex;
use sqlworker::{
    DatabaseHandle, DatabaseHandleRef, DatabaseIdentity, DatabaseThread, HandleId,
    TaskSynchronizer,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route worker logs to the test harness output.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

pub fn identity(name: &str) -> DatabaseIdentity {
    DatabaseIdentity::new("https://app.example.com", name)
}

/// Start a default thread with logging enabled.
pub fn start_thread() -> DatabaseThread {
    init_tracing();
    let thread = DatabaseThread::create();
    thread.start().expect("start database thread");
    thread
}

/// Request termination and wait for cleanup to finish.
pub fn shut_down(thread: &DatabaseThread) {
    let done = Arc::new(TaskSynchronizer::new());
    thread.request_termination(Some(Arc::clone(&done)));
    assert!(
        done.wait_timeout(Duration::from_secs(10)),
        "database thread did not terminate"
    );
}

// ============================================================================
// In-memory database handle
// ============================================================================

/// Key-value contents shared by every handle on the same database.
pub type Store = Arc<Mutex<BTreeMap<String, String>>>;

/// Handle over an in-memory store.
///
/// Writes go through an uncommitted buffer; `close_immediately` rolls the
/// buffer back, like a real backend dropping an open transaction.
pub struct MemoryHandle {
    id: HandleId,
    identity: DatabaseIdentity,
    store: Store,
    pending: Mutex<BTreeMap<String, String>>,
    closed: AtomicBool,
    closes: AtomicUsize,
}

impl MemoryHandle {
    pub fn open(identity: DatabaseIdentity, store: &Store) -> Arc<Self> {
        Arc::new(Self {
            id: HandleId::next(),
            identity,
            store: Arc::clone(store),
            pending: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn put(&self, key: &str, value: &str) {
        assert!(!self.is_closed(), "write on closed handle");
        self.pending.lock().insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.store.lock().get(key).cloned()
    }

    pub fn commit(&self) {
        let pending = std::mem::take(&mut *self.pending.lock());
        self.store.lock().extend(pending);
    }

    pub fn rollback(&self) {
        self.pending.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn handle_ref(self: &Arc<Self>) -> DatabaseHandleRef {
        Arc::clone(self) as DatabaseHandleRef
    }
}

impl DatabaseHandle for MemoryHandle {
    fn handle_id(&self) -> HandleId {
        self.id
    }

    fn identity(&self) -> &DatabaseIdentity {
        &self.identity
    }

    fn close_immediately(&self) {
        self.rollback();
        self.closed.store(true, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
