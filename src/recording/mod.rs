//! Chunked recording of the processed and original streams.
//!
//! # Overview
//!
//! [`RecordingManager`] runs two [`ChunkRecorder`]s in lock-step, one fed
//! the processed output and one the untouched input, so every chunk
//! boundary yields a comparable "enhanced"/"original" pair.  At each
//! boundary the pair is stopped, the payloads validated against a minimum
//! size, the surviving payloads parked in the [`BlobRegistry`], and a fresh
//! cycle started.
//!
//! Real platform recorders occasionally deliver empty or near-empty
//! payloads; those cycles are tolerated, not fatal:
//!
//! - both payloads under the threshold: the cycle is discarded, no record;
//! - one payload under the threshold: the record is kept but marked
//!   invalid, with an error message and no blob handle for the bad side.
//!
//! Record history is bounded (`max_chunks` ceiling, evict down to
//! `keep_chunks`) and eviction releases the evicted records' blob handles,
//! which is what keeps hours-long sessions from accumulating every chunk
//! they ever produced.

pub mod blobs;
pub mod recorder;

pub use blobs::{BlobId, BlobRegistry};
pub use recorder::{ChunkRecorder, WavChunkRecorder};

use std::collections::VecDeque;
use std::sync::Arc;

/// Limits and cadence for chunked recording.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RecordingConfig {
    /// Cycle length in milliseconds.
    pub chunk_duration_ms: u64,
    /// Payloads below this byte count are treated as recorder glitches.
    pub min_valid_bytes: usize,
    /// Record-history ceiling that triggers eviction.
    pub max_chunks: usize,
    /// Records kept after an eviction pass.
    pub keep_chunks: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            chunk_duration_ms: 5_000,
            min_valid_bytes: 1_024,
            max_chunks: 12,
            keep_chunks: 8,
        }
    }
}

/// Immutable record of one finalized recording cycle.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ChunkRecord {
    pub id: u64,
    pub start_ms: f64,
    pub end_ms: f64,
    pub duration_ms: f64,
    /// `true` only when both payloads met the minimum size.
    pub valid: bool,
    /// Populated for invalid records; names the side(s) that failed.
    pub error: Option<String>,
    /// Handle to the processed payload; `None` when that side was invalid.
    pub processed_blob: Option<BlobId>,
    /// Handle to the original payload; `None` when that side was invalid.
    pub original_blob: Option<BlobId>,
    pub processed_bytes: usize,
    pub original_bytes: usize,
}

impl ChunkRecord {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Cycles a processed/original recorder pair across chunk boundaries.
pub struct RecordingManager {
    config: RecordingConfig,
    blobs: Arc<BlobRegistry>,
    processed: Box<dyn ChunkRecorder>,
    original: Box<dyn ChunkRecorder>,
    records: VecDeque<ChunkRecord>,
    next_id: u64,
    recording: bool,
    paused: bool,
    cycle_started_ms: f64,
}

impl RecordingManager {
    /// Manager with the production WAV recorders.
    pub fn new(config: RecordingConfig, blobs: Arc<BlobRegistry>) -> Self {
        Self::with_recorders(
            config,
            blobs,
            Box::new(WavChunkRecorder::new()),
            Box::new(WavChunkRecorder::new()),
        )
    }

    /// Manager with caller-supplied recorders (tests inject scripted ones).
    pub fn with_recorders(
        config: RecordingConfig,
        blobs: Arc<BlobRegistry>,
        processed: Box<dyn ChunkRecorder>,
        original: Box<dyn ChunkRecorder>,
    ) -> Self {
        Self {
            config,
            blobs,
            processed,
            original,
            records: VecDeque::new(),
            next_id: 0,
            recording: false,
            paused: false,
            cycle_started_ms: 0.0,
        }
    }

    /// Begin recording; the first cycle starts at `now_ms`.
    pub fn start(&mut self, now_ms: f64) {
        if self.recording {
            return;
        }
        self.recording = true;
        self.paused = false;
        self.cycle_started_ms = now_ms;
        self.processed.start();
        self.original.start();
    }

    /// Feed one original/processed sample run into the current cycle.
    /// Ignored while stopped or paused.
    pub fn push(&mut self, original: &[f32], processed: &[f32]) {
        if !self.recording || self.paused {
            return;
        }
        self.original.push_samples(original);
        self.processed.push_samples(processed);
    }

    /// Cycle the recorder pair if the chunk duration has elapsed.
    pub fn maybe_cycle(&mut self, now_ms: f64) -> Option<ChunkRecord> {
        if !self.recording || self.paused {
            return None;
        }
        if now_ms - self.cycle_started_ms < self.config.chunk_duration_ms as f64 {
            return None;
        }
        self.cycle(now_ms, true)
    }

    /// Suspend feeding without tearing down the recorder pair.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Stop recording, finalizing the in-flight tail cycle so it is not
    /// lost.  Returns the final record if that cycle produced one.
    pub fn stop(&mut self, now_ms: f64) -> Option<ChunkRecord> {
        if !self.recording {
            return None;
        }
        let record = self.cycle(now_ms, false);
        self.recording = false;
        self.paused = false;
        record
    }

    /// Finalized records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &ChunkRecord> {
        self.records.iter()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Drop all records and release their blob handles.
    pub fn clear(&mut self) {
        for record in self.records.drain(..) {
            release_record_blobs(&self.blobs, &record);
        }
    }

    /// Stop the pair, assemble a record and (when `restart`) begin the next
    /// cycle.  Returns `None` for a discarded cycle.
    fn cycle(&mut self, now_ms: f64, restart: bool) -> Option<ChunkRecord> {
        let processed_bytes = self.processed.stop();
        let original_bytes = self.original.stop();

        if restart {
            self.processed.start();
            self.original.start();
        }

        let start_ms = self.cycle_started_ms;
        self.cycle_started_ms = now_ms;

        let processed_ok = processed_bytes.len() >= self.config.min_valid_bytes;
        let original_ok = original_bytes.len() >= self.config.min_valid_bytes;

        if !processed_ok && !original_ok {
            log::warn!(
                "recording cycle discarded: both payloads under {} bytes",
                self.config.min_valid_bytes
            );
            return None;
        }

        let error = match (processed_ok, original_ok) {
            (true, true) => None,
            (false, true) => Some(format!(
                "processed payload too small ({} < {} bytes)",
                processed_bytes.len(),
                self.config.min_valid_bytes
            )),
            (true, false) => Some(format!(
                "original payload too small ({} < {} bytes)",
                original_bytes.len(),
                self.config.min_valid_bytes
            )),
            (false, false) => unreachable!(),
        };

        let processed_len = processed_bytes.len();
        let original_len = original_bytes.len();

        let record = ChunkRecord {
            id: self.next_id,
            start_ms,
            end_ms: now_ms,
            duration_ms: now_ms - start_ms,
            valid: processed_ok && original_ok,
            error,
            processed_blob: processed_ok.then(|| self.blobs.register(processed_bytes)),
            original_blob: original_ok.then(|| self.blobs.register(original_bytes)),
            processed_bytes: processed_len,
            original_bytes: original_len,
        };
        self.next_id += 1;

        self.records.push_back(record.clone());
        self.evict_old_records();
        Some(record)
    }

    fn evict_old_records(&mut self) {
        if self.records.len() <= self.config.max_chunks {
            return;
        }
        let keep = self.config.keep_chunks.min(self.config.max_chunks);
        while self.records.len() > keep {
            if let Some(evicted) = self.records.pop_front() {
                release_record_blobs(&self.blobs, &evicted);
                log::debug!("evicted chunk record {}", evicted.id);
            }
        }
    }
}

fn release_record_blobs(blobs: &BlobRegistry, record: &ChunkRecord) {
    if let Some(id) = record.processed_blob {
        blobs.release(id);
    }
    if let Some(id) = record.original_blob {
        blobs.release(id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::recorder::ScriptedRecorder;
    use super::*;

    fn test_config() -> RecordingConfig {
        RecordingConfig {
            chunk_duration_ms: 1_000,
            min_valid_bytes: 100,
            max_chunks: 4,
            keep_chunks: 2,
        }
    }

    fn manager_with(
        processed: ScriptedRecorder,
        original: ScriptedRecorder,
    ) -> (RecordingManager, Arc<BlobRegistry>) {
        let blobs = Arc::new(BlobRegistry::new());
        let manager = RecordingManager::with_recorders(
            test_config(),
            Arc::clone(&blobs),
            Box::new(processed),
            Box::new(original),
        );
        (manager, blobs)
    }

    // ---- Validity rules ---------------------------------------------------------

    #[test]
    fn healthy_cycle_produces_valid_record_with_both_blobs() {
        let (mut m, blobs) =
            manager_with(ScriptedRecorder::healthy(500), ScriptedRecorder::healthy(500));
        m.start(0.0);

        let record = m.maybe_cycle(1_000.0).unwrap();
        assert!(record.valid);
        assert!(record.error.is_none());
        assert!(record.processed_blob.is_some());
        assert!(record.original_blob.is_some());
        assert_eq!(blobs.len(), 2);
    }

    #[test]
    fn both_payloads_invalid_discards_the_cycle() {
        let (mut m, blobs) = manager_with(
            ScriptedRecorder::new(&[10], 500),
            ScriptedRecorder::new(&[0], 500),
        );
        m.start(0.0);

        assert!(m.maybe_cycle(1_000.0).is_none());
        assert_eq!(m.record_count(), 0);
        assert_eq!(blobs.len(), 0);

        // The pair restarted; the next cycle is healthy again.
        assert!(m.maybe_cycle(2_000.0).is_some());
    }

    #[test]
    fn one_invalid_payload_marks_record_invalid_without_that_blob() {
        let (mut m, blobs) = manager_with(
            ScriptedRecorder::new(&[10], 500), // processed side glitches once
            ScriptedRecorder::healthy(500),
        );
        m.start(0.0);

        let record = m.maybe_cycle(1_000.0).unwrap();
        assert!(!record.valid);
        assert!(record.error.as_ref().unwrap().contains("processed"));
        assert!(record.processed_blob.is_none());
        assert!(record.original_blob.is_some());
        assert_eq!(blobs.len(), 1);
    }

    // ---- Cycle timing -------------------------------------------------------------

    #[test]
    fn no_cycle_before_the_chunk_duration_elapses() {
        let (mut m, _blobs) =
            manager_with(ScriptedRecorder::healthy(500), ScriptedRecorder::healthy(500));
        m.start(0.0);
        assert!(m.maybe_cycle(999.0).is_none());
        assert!(m.maybe_cycle(1_000.0).is_some());
    }

    #[test]
    fn records_carry_contiguous_time_ranges() {
        let (mut m, _blobs) =
            manager_with(ScriptedRecorder::healthy(500), ScriptedRecorder::healthy(500));
        m.start(0.0);

        let a = m.maybe_cycle(1_000.0).unwrap();
        let b = m.maybe_cycle(2_000.0).unwrap();
        assert_eq!(a.end_ms, b.start_ms);
        assert_eq!(a.id + 1, b.id);
        assert_eq!(b.duration_ms, 1_000.0);
    }

    // ---- Pause / resume / stop -----------------------------------------------------

    #[test]
    fn paused_manager_neither_feeds_nor_cycles() {
        let (mut m, _blobs) =
            manager_with(ScriptedRecorder::healthy(500), ScriptedRecorder::healthy(500));
        m.start(0.0);
        m.pause();

        assert!(m.maybe_cycle(5_000.0).is_none());
        m.resume();
        assert!(m.maybe_cycle(5_000.0).is_some());
    }

    #[test]
    fn stop_finalizes_the_tail_cycle() {
        let (mut m, _blobs) =
            manager_with(ScriptedRecorder::healthy(500), ScriptedRecorder::healthy(500));
        m.start(0.0);

        // Stop mid-cycle: the in-flight tail still becomes a record.
        let record = m.stop(400.0).unwrap();
        assert_eq!(record.duration_ms, 400.0);
        assert!(!m.is_recording());

        // Stopped manager ignores further pushes and cycles.
        m.push(&[0.0; 10], &[0.0; 10]);
        assert!(m.maybe_cycle(10_000.0).is_none());
        assert!(m.stop(11_000.0).is_none());
    }

    #[test]
    fn start_is_idempotent_while_recording() {
        let (mut m, _blobs) =
            manager_with(ScriptedRecorder::healthy(500), ScriptedRecorder::healthy(500));
        m.start(0.0);
        m.start(500.0); // ignored; the cycle clock stays at 0

        assert!(m.maybe_cycle(1_000.0).is_some());
    }

    // ---- Eviction -------------------------------------------------------------------

    #[test]
    fn history_is_bounded_and_eviction_releases_blobs() {
        let (mut m, blobs) =
            manager_with(ScriptedRecorder::healthy(500), ScriptedRecorder::healthy(500));
        m.start(0.0);

        for i in 1..=5 {
            m.maybe_cycle(i as f64 * 1_000.0);
        }

        // 5 records exceed max_chunks=4; history drops to keep_chunks=2.
        assert_eq!(m.record_count(), 2);
        assert_eq!(blobs.len(), 4); // 2 records × 2 blobs

        let ids: Vec<u64> = m.records().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4]); // oldest evicted first
    }

    #[test]
    fn clear_releases_everything() {
        let (mut m, blobs) =
            manager_with(ScriptedRecorder::healthy(500), ScriptedRecorder::healthy(500));
        m.start(0.0);
        m.maybe_cycle(1_000.0);
        m.maybe_cycle(2_000.0);

        m.clear();
        assert_eq!(m.record_count(), 0);
        assert!(blobs.is_empty());
    }

    // ---- WAV integration ----------------------------------------------------------------

    #[test]
    fn wav_recorders_produce_parseable_blobs() {
        let blobs = Arc::new(BlobRegistry::new());
        let mut m = RecordingManager::new(
            RecordingConfig {
                min_valid_bytes: 44,
                ..test_config()
            },
            Arc::clone(&blobs),
        );
        m.start(0.0);
        m.push(&[0.5; 4_800], &[0.1; 4_800]);

        let record = m.maybe_cycle(1_000.0).unwrap();
        assert!(record.valid);

        let payload = blobs.get(record.processed_blob.unwrap()).unwrap();
        let audio = crate::wav::parse_wav(&payload).unwrap();
        assert_eq!(audio.samples.len(), 4_800);
    }
}
