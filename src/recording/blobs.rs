//! Blob handle registry.
//!
//! Recorded chunk payloads are kept here behind opaque [`BlobId`] handles
//! instead of being copied into every chunk record.  Handles must be
//! released explicitly when a record is evicted, otherwise an hours-long
//! session leaks every chunk it ever recorded.  `release` is idempotent so
//! eviction and teardown can race without double-free bookkeeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Opaque handle to a registered payload.
pub type BlobId = u64;

/// Thread-safe id → bytes store.
#[derive(Default)]
pub struct BlobRegistry {
    blobs: Mutex<HashMap<BlobId, Arc<Vec<u8>>>>,
    next_id: AtomicU64,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload and return its handle.
    pub fn register(&self, bytes: Vec<u8>) -> BlobId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.blobs.lock().unwrap().insert(id, Arc::new(bytes));
        id
    }

    /// Fetch a payload without copying.  `None` when the handle was
    /// released or never existed.
    pub fn get(&self, id: BlobId) -> Option<Arc<Vec<u8>>> {
        self.blobs.lock().unwrap().get(&id).cloned()
    }

    /// Drop a payload.  Returns `false` when the handle is already gone;
    /// releasing twice is safe.
    pub fn release(&self, id: BlobId) -> bool {
        self.blobs.lock().unwrap().remove(&id).is_some()
    }

    /// Drop every payload.  Used at engine teardown.
    pub fn release_all(&self) {
        self.blobs.lock().unwrap().clear();
    }

    /// Number of live handles.  Leak checks in long-session tests rely on
    /// this.
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
