//! Per-frame / per-chunk signal statistics without unbounded history.
//!
//! [`MetricsAggregator`] is mutated from the audio hot path (cheap clamped
//! stores and bounded ring pushes only — no allocation beyond the fixed
//! histories, no I/O) and read by consumers as value-copied
//! [`MetricsSnapshot`]s, never as a live reference, so readers can never
//! observe a torn update.
//!
//! Latency is derived from inter-frame timestamp deltas over a bounded
//! window; voice-activity percentage from a bounded rolling VAD history
//! compared against a fixed threshold.  The auto-update task pushes
//! snapshots onto the [`EventBus`] at a fixed cadence for live UI
//! consumption.
//!
//! Noise reduction uses one canonical unit everywhere: **percent, 0–100**.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;

use crate::events::{EngineEvent, EventBus};

/// Retained inter-frame timestamps for the latency moving average.
const FRAME_HISTORY: usize = 100;

/// Retained VAD values for the voice-activity percentage.
const VAD_HISTORY: usize = 100;

/// VAD above this threshold counts as "voice".
const VOICE_THRESHOLD: f32 = 0.5;

/// Default auto-update cadence.
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 100;

// ---------------------------------------------------------------------------
// MetricsSnapshot
// ---------------------------------------------------------------------------

/// Value-copied view of the aggregator at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Noise reduction in percent, `[0.0, 100.0]`.
    pub noise_reduction_pct: f32,
    /// Moving-average inter-frame latency in milliseconds; `0.0` until at
    /// least two frames have been recorded.
    pub latency_ms: f64,
    /// Peak input level, `[0.0, 1.0]`.
    pub input_level: f32,
    /// Peak output level, `[0.0, 1.0]`.
    pub output_level: f32,
    /// Latest voice-activity probability, `[0.0, 1.0]`.
    pub voice_activity: f32,
    /// Share of recent frames whose VAD exceeded the voice threshold, in
    /// percent.
    pub voice_activity_pct: f32,
    /// Frames processed since construction or the last reset.
    pub frames_processed: u64,
    /// Chunks emitted since construction or the last reset.
    pub chunks_emitted: u64,
    /// Frames dropped because processing failed.
    pub frames_dropped: u64,
    /// Milliseconds since the aggregator epoch at the last mutation.
    pub last_update_ms: f64,
}

impl MetricsSnapshot {
    /// Serialize for the diagnostics surface.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

// ---------------------------------------------------------------------------
// MetricsAggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MetricsInner {
    noise_reduction_pct: f32,
    input_level: f32,
    output_level: f32,
    voice_activity: f32,
    frames_processed: u64,
    chunks_emitted: u64,
    frames_dropped: u64,
    last_update_ms: f64,
    frame_times: VecDeque<f64>,
    vad_history: VecDeque<f32>,
}

impl MetricsInner {
    fn latency_ms(&self) -> f64 {
        if self.frame_times.len() < 2 {
            return 0.0;
        }
        let deltas = self.frame_times.len() - 1;
        let total: f64 = self
            .frame_times
            .iter()
            .zip(self.frame_times.iter().skip(1))
            .map(|(a, b)| b - a)
            .sum();
        total / deltas as f64
    }

    fn voice_activity_pct(&self) -> f32 {
        if self.vad_history.is_empty() {
            return 0.0;
        }
        let voiced = self
            .vad_history
            .iter()
            .filter(|&&v| v > VOICE_THRESHOLD)
            .count();
        voiced as f32 / self.vad_history.len() as f32 * 100.0
    }
}

/// Accumulates signal statistics and serves bounded, clamped snapshots.
///
/// Shared as `Arc<MetricsAggregator>` between the engine, its sessions and
/// the auto-update task.
pub struct MetricsAggregator {
    inner: Mutex<MetricsInner>,
    epoch: Instant,
    updater: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    /// Create an aggregator with a fresh epoch.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsInner::default()),
            epoch: Instant::now(),
            updater: Mutex::new(None),
        }
    }

    /// Milliseconds elapsed since this aggregator was created.
    pub fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }

    // -----------------------------------------------------------------------
    // Clamped updates
    // -----------------------------------------------------------------------

    /// Store the latest peak input level, clamped to `[0, 1]`.
    pub fn update_input_level(&self, level: f32) {
        let now = self.now_ms();
        let mut inner = self.inner.lock().unwrap();
        inner.input_level = clamp_unit(level);
        inner.last_update_ms = now;
    }

    /// Store the latest peak output level, clamped to `[0, 1]`.
    pub fn update_output_level(&self, level: f32) {
        let now = self.now_ms();
        let mut inner = self.inner.lock().unwrap();
        inner.output_level = clamp_unit(level);
        inner.last_update_ms = now;
    }

    /// Store the latest voice-activity probability, clamped to `[0, 1]`,
    /// and append it to the bounded VAD history.
    pub fn update_vad(&self, vad: f32) {
        let now = self.now_ms();
        let vad = clamp_unit(vad);
        let mut inner = self.inner.lock().unwrap();
        inner.voice_activity = vad;
        if inner.vad_history.len() == VAD_HISTORY {
            inner.vad_history.pop_front();
        }
        inner.vad_history.push_back(vad);
        inner.last_update_ms = now;
    }

    /// Store the latest noise-reduction value, clamped to `[0, 100]`.
    pub fn update_noise_reduction(&self, pct: f32) {
        let now = self.now_ms();
        let mut inner = self.inner.lock().unwrap();
        inner.noise_reduction_pct = if pct.is_finite() {
            pct.clamp(0.0, 100.0)
        } else {
            0.0
        };
        inner.last_update_ms = now;
    }

    /// Record a processed frame at `timestamp_ms` (aggregator epoch
    /// milliseconds).  Timestamps feed the bounded latency window; the
    /// oldest entry is evicted on overflow.
    pub fn record_frame(&self, timestamp_ms: f64) {
        let mut inner = self.inner.lock().unwrap();
        if inner.frame_times.len() == FRAME_HISTORY {
            inner.frame_times.pop_front();
        }
        inner.frame_times.push_back(timestamp_ms);
        inner.frames_processed += 1;
        inner.last_update_ms = timestamp_ms;
    }

    /// Count an emitted chunk.
    pub fn record_chunk(&self) {
        let now = self.now_ms();
        let mut inner = self.inner.lock().unwrap();
        inner.chunks_emitted += 1;
        inner.last_update_ms = now;
    }

    /// Count a dropped frame (processing failure replaced by silence).
    pub fn record_dropped_frame(&self) {
        let now = self.now_ms();
        let mut inner = self.inner.lock().unwrap();
        inner.frames_dropped += 1;
        inner.last_update_ms = now;
    }

    // -----------------------------------------------------------------------
    // Reading / reset
    // -----------------------------------------------------------------------

    /// Value-copied snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().unwrap();
        MetricsSnapshot {
            noise_reduction_pct: inner.noise_reduction_pct,
            latency_ms: inner.latency_ms(),
            input_level: inner.input_level,
            output_level: inner.output_level,
            voice_activity: inner.voice_activity,
            voice_activity_pct: inner.voice_activity_pct(),
            frames_processed: inner.frames_processed,
            chunks_emitted: inner.chunks_emitted,
            frames_dropped: inner.frames_dropped,
            last_update_ms: inner.last_update_ms,
        }
    }

    /// Reset all metrics and histories to their initial state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MetricsInner::default();
    }

    // -----------------------------------------------------------------------
    // Auto-update task
    // -----------------------------------------------------------------------

    /// Start the periodic snapshot push onto `events`.
    ///
    /// Idempotent: a second call while a task is running is a no-op.
    /// Requires a tokio runtime.
    pub fn start_auto_update(self: &Arc<Self>, interval_ms: u64, events: EventBus) {
        let mut updater = self.updater.lock().unwrap();
        if updater.is_some() {
            return;
        }

        let metrics = Arc::clone(self);
        let interval_ms = interval_ms.max(1);
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            // The first tick fires immediately; skip it so the cadence is
            // interval-aligned from the start.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                events.emit(&EngineEvent::MetricsUpdated(metrics.snapshot()));
            }
        });

        *updater = Some(handle);
    }

    /// Cancel the periodic push.  Idempotent; afterwards no further
    /// `MetricsUpdated` events are emitted.
    pub fn stop_auto_update(&self) {
        if let Some(handle) = self.updater.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// `true` while the auto-update task is running.
    pub fn auto_update_running(&self) -> bool {
        self.updater.lock().unwrap().is_some()
    }
}

impl Drop for MetricsAggregator {
    fn drop(&mut self) {
        self.stop_auto_update();
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ---- Clamping ------------------------------------------------------------

    #[test]
    fn levels_are_clamped_to_unit_range() {
        let m = MetricsAggregator::new();

        m.update_input_level(1.7);
        m.update_output_level(-0.3);
        m.update_vad(42.0);

        let s = m.snapshot();
        assert_eq!(s.input_level, 1.0);
        assert_eq!(s.output_level, 0.0);
        assert_eq!(s.voice_activity, 1.0);
    }

    #[test]
    fn nan_inputs_are_stored_as_zero_not_raw() {
        let m = MetricsAggregator::new();
        m.update_input_level(f32::NAN);
        m.update_noise_reduction(f32::INFINITY);

        let s = m.snapshot();
        assert_eq!(s.input_level, 0.0);
        assert_eq!(s.noise_reduction_pct, 0.0);
    }

    #[test]
    fn noise_reduction_is_clamped_to_percent_range() {
        let m = MetricsAggregator::new();
        m.update_noise_reduction(250.0);
        assert_eq!(m.snapshot().noise_reduction_pct, 100.0);

        m.update_noise_reduction(-10.0);
        assert_eq!(m.snapshot().noise_reduction_pct, 0.0);

        m.update_noise_reduction(37.5);
        assert!((m.snapshot().noise_reduction_pct - 37.5).abs() < 1e-6);
    }

    // ---- Latency --------------------------------------------------------------

    #[test]
    fn latency_is_zero_with_fewer_than_two_frames() {
        let m = MetricsAggregator::new();
        assert_eq!(m.snapshot().latency_ms, 0.0);

        m.record_frame(10.0);
        assert_eq!(m.snapshot().latency_ms, 0.0);
    }

    #[test]
    fn latency_is_average_of_deltas() {
        let m = MetricsAggregator::new();
        m.record_frame(0.0);
        m.record_frame(10.0);
        m.record_frame(30.0);
        // Deltas: 10, 20 → average 15.
        assert!((m.snapshot().latency_ms - 15.0).abs() < 1e-9);
    }

    #[test]
    fn frame_history_is_bounded() {
        let m = MetricsAggregator::new();
        for i in 0..(FRAME_HISTORY * 3) {
            m.record_frame(i as f64 * 10.0);
        }
        // Constant 10 ms cadence regardless of how many frames were pushed.
        assert!((m.snapshot().latency_ms - 10.0).abs() < 1e-9);
        assert_eq!(m.snapshot().frames_processed, (FRAME_HISTORY * 3) as u64);
    }

    // ---- Voice activity ----------------------------------------------------------

    #[test]
    fn voice_activity_pct_counts_frames_above_threshold() {
        let m = MetricsAggregator::new();
        // 3 voiced, 1 silent
        m.update_vad(0.9);
        m.update_vad(0.8);
        m.update_vad(0.7);
        m.update_vad(0.1);
        assert!((m.snapshot().voice_activity_pct - 75.0).abs() < 1e-5);
    }

    #[test]
    fn voice_activity_pct_is_zero_with_no_history() {
        let m = MetricsAggregator::new();
        assert_eq!(m.snapshot().voice_activity_pct, 0.0);
    }

    #[test]
    fn vad_history_is_bounded() {
        let m = MetricsAggregator::new();
        // Fill with voiced, then overwrite entirely with silence.
        for _ in 0..VAD_HISTORY {
            m.update_vad(1.0);
        }
        for _ in 0..VAD_HISTORY {
            m.update_vad(0.0);
        }
        assert_eq!(m.snapshot().voice_activity_pct, 0.0);
    }

    // ---- Counters / reset -----------------------------------------------------------

    #[test]
    fn counters_track_and_reset() {
        let m = MetricsAggregator::new();
        m.record_frame(1.0);
        m.record_frame(2.0);
        m.record_chunk();
        m.record_dropped_frame();

        let s = m.snapshot();
        assert_eq!(s.frames_processed, 2);
        assert_eq!(s.chunks_emitted, 1);
        assert_eq!(s.frames_dropped, 1);

        m.reset();
        let s = m.snapshot();
        assert_eq!(s.frames_processed, 0);
        assert_eq!(s.chunks_emitted, 0);
        assert_eq!(s.frames_dropped, 0);
        assert_eq!(s.latency_ms, 0.0);
    }

    #[test]
    fn last_update_is_monotonic() {
        let m = MetricsAggregator::new();
        m.update_input_level(0.5);
        let first = m.snapshot().last_update_ms;
        m.update_output_level(0.5);
        let second = m.snapshot().last_update_ms;
        assert!(second >= first);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let m = MetricsAggregator::new();
        m.update_noise_reduction(50.0);
        let json = m.snapshot().to_json();
        assert_eq!(json["noise_reduction_pct"], 50.0);
        assert!(json["frames_processed"].is_u64());
    }

    // ---- Auto-update -------------------------------------------------------------------

    #[tokio::test]
    async fn auto_update_emits_snapshots() {
        let m = Arc::new(MetricsAggregator::new());
        let bus = EventBus::new();

        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        bus.subscribe(move |event| {
            if matches!(event, EngineEvent::MetricsUpdated(_)) {
                hits2.fetch_add(1, Ordering::SeqCst);
            }
        });

        m.start_auto_update(10, bus);
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        m.stop_auto_update();

        assert!(hits.load(Ordering::SeqCst) >= 2, "expected periodic pushes");
    }

    #[tokio::test]
    async fn auto_update_start_is_idempotent() {
        let m = Arc::new(MetricsAggregator::new());
        let bus = EventBus::new();

        m.start_auto_update(10, bus.clone());
        m.start_auto_update(10, bus); // second start is a no-op
        assert!(m.auto_update_running());

        m.stop_auto_update();
        m.stop_auto_update(); // second stop is a no-op
        assert!(!m.auto_update_running());
    }

    #[tokio::test]
    async fn stop_fully_cancels_the_timer() {
        let m = Arc::new(MetricsAggregator::new());
        let bus = EventBus::new();

        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        bus.subscribe(move |event| {
            if matches!(event, EngineEvent::MetricsUpdated(_)) {
                hits2.fetch_add(1, Ordering::SeqCst);
            }
        });

        m.start_auto_update(10, bus);
        m.stop_auto_update();
        let before = hits.load(Ordering::SeqCst);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), before, "dangling timer");
    }
}
