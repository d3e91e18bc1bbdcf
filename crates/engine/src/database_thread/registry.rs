//! Open-database registry
//!
//! Tracks which database handles are in use on the database thread. The
//! registry holds weak references only: the document-side owner keeps the
//! handle alive, the registry merely knows it is open.
//!
//! Closing goes through the registry. A handle is removed from the set before
//! it is closed, so no path can close the same handle twice.

use sqlworker_core::{DatabaseIdentity, HandleId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// One open connection to a database
pub trait DatabaseHandle: Send + Sync {
    /// Unique id of this connection
    fn handle_id(&self) -> HandleId;

    /// Database this connection is attached to
    fn identity(&self) -> &DatabaseIdentity;

    /// Roll back in-flight work and close without waiting for the owner
    ///
    /// Called at most once per handle by the database thread.
    fn close_immediately(&self);
}

/// Shared reference to a database handle
pub type DatabaseHandleRef = Arc<dyn DatabaseHandle>;

/// Set of handles open on the database thread
#[derive(Default)]
pub struct OpenDatabaseRegistry {
    open: HashMap<HandleId, Weak<dyn DatabaseHandle>>,
}

impl OpenDatabaseRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handle`; returns `false` if it was already recorded
    pub fn record_open(&mut self, handle: &DatabaseHandleRef) -> bool {
        self.open
            .insert(handle.handle_id(), Arc::downgrade(handle))
            .is_none()
    }

    /// Remove `handle`; returns `false` if it was not recorded
    pub fn record_closed(&mut self, handle: &DatabaseHandleRef) -> bool {
        self.open.remove(&handle.handle_id()).is_some()
    }

    /// Whether `handle` is recorded as open
    pub fn is_open(&self, handle: &DatabaseHandleRef) -> bool {
        self.open.contains_key(&handle.handle_id())
    }

    /// Number of recorded handles, including ones whose owner already dropped them
    pub fn len(&self) -> usize {
        self.open.len()
    }

    /// Whether no handle is recorded
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Empty the registry and return the handles that are still alive
    ///
    /// Handles come back ordered by id. The caller closes them; since they are
    /// no longer recorded, nothing else can close them again.
    pub fn take_all(&mut self) -> Vec<DatabaseHandleRef> {
        let mut entries: Vec<_> = self.open.drain().collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
            .into_iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }
}
