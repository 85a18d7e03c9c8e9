//! Typed publish-subscribe event channel.
//!
//! [`EventBus`] replaces the ad-hoc callback arrays of earlier designs with
//! one explicit, clonable channel.  Every engine signal — state changes,
//! metrics snapshots, completed chunks, degraded-mode entry — travels
//! through it as an [`EngineEvent`].
//!
//! Listener isolation is guaranteed: a panicking listener is caught and
//! logged, and the remaining listeners still fire.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::chunk::ChunkInfo;
use crate::engine::state::EngineState;
use crate::metrics::MetricsSnapshot;
use crate::recording::ChunkRecord;

// ---------------------------------------------------------------------------
// EngineEvent
// ---------------------------------------------------------------------------

/// Everything the engine can tell its consumers about.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The lifecycle state machine completed a legal transition.
    StateChanged { from: EngineState, to: EngineState },

    /// Initialization finished and the engine is ready for sessions.
    Initialized,

    /// Model load failed but the configuration allows degraded mode; the
    /// engine is running on the energy-gate fallback.
    DegradedMode { reason: String },

    /// The first active session started.
    ProcessingStarted,

    /// The last active session stopped.
    ProcessingEnded,

    /// Periodic metrics push (see `MetricsAggregator::start_auto_update`).
    MetricsUpdated(MetricsSnapshot),

    /// The chunk processor finalized a fixed-duration chunk.
    ChunkReady(ChunkInfo),

    /// The recording manager finalized a recorded chunk (valid or not).
    RecordingChunk(ChunkRecord),

    /// A contained error occurred (hot-path frame failure, recorder cycle
    /// failure, …).  The session keeps running.
    ErrorOccurred(String),

    /// The engine finished tearing down.
    Destroyed,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Identifier returned by [`EventBus::subscribe`]; pass it to
/// [`EventBus::unsubscribe`] to remove the listener.
pub type SubscriptionId = u64;

type Listener = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

struct BusInner {
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

/// Clonable, thread-safe event channel.
///
/// Cloning is cheap (`Arc` clone); all clones share the same listener set.
///
/// # Example
///
/// ```rust
/// use stream_denoise::events::{EngineEvent, EventBus};
///
/// let bus = EventBus::new();
/// let id = bus.subscribe(|event| {
///     if let EngineEvent::ProcessingStarted = event {
///         println!("processing started");
///     }
/// });
/// bus.emit(&EngineEvent::ProcessingStarted);
/// bus.unsubscribe(id);
/// ```
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a listener and return its subscription id.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener.  Returns `false` when the id is unknown (already
    /// removed, or never issued) — safe to call twice.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Deliver `event` to every listener.
    ///
    /// The listener list is snapshotted before dispatch, so listeners may
    /// subscribe/unsubscribe from inside a callback without deadlocking.
    /// A panicking listener is logged and skipped; the rest still fire.
    pub fn emit(&self, event: &EngineEvent) {
        let snapshot: Vec<(SubscriptionId, Listener)> =
            self.inner.listeners.lock().unwrap().clone();

        for (id, listener) in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| listener(event)));
            if result.is_err() {
                log::error!("event listener {id} panicked; continuing with remaining listeners");
            }
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().unwrap().len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
