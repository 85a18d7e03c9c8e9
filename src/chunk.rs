//! Groups processed frames into fixed-duration chunks.
//!
//! # Overview
//!
//! [`ChunkProcessor`] accumulates parallel original/processed sample runs
//! and cuts them into chunks of exactly `samples_per_chunk` samples
//! (derived from the configured duration at 48 kHz).  A single large input
//! may yield several chunks; a chunk boundary falling inside an
//! accumulated buffer splits it, consuming the prefix and keeping the
//! remainder.
//!
//! With a non-zero overlap fraction the tail of the previous processed
//! chunk is linearly crossfaded into the head of the next one (fade-in +
//! fade-out weights sum to 1 at every sample, chunk length is unchanged)
//! so chunk boundaries do not click when played back to back.
//!
//! `flush()` zero-pads whatever is pending into one final chunk and
//! resets; flushing with nothing pending is a no-op.  A panicking chunk
//! callback is caught and logged, never allowed to poison the stream.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::audio::codec::SAMPLE_RATE;
use crate::audio::level::{calculate_peak, calculate_rms};

/// Per-chunk statistics delivered with every emitted chunk.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ChunkInfo {
    /// Zero-based chunk index within the stream.
    pub id: u64,
    /// Stream position of the first sample, in milliseconds.
    pub start_ms: f64,
    /// Stream position one past the last sample, in milliseconds.
    pub end_ms: f64,
    /// Samples in this chunk (always `samples_per_chunk`).
    pub sample_count: usize,
    pub original_rms: f32,
    pub processed_rms: f32,
    pub original_peak: f32,
    pub processed_peak: f32,
    /// `(1 - processed_rms / original_rms) × 100`, clamped to `[0, 100]`;
    /// `0` when the original chunk is silent.
    pub noise_removed_pct: f32,
}

/// One emitted chunk: statistics plus both sample runs.
#[derive(Debug, Clone)]
pub struct ProcessedChunk {
    pub info: ChunkInfo,
    /// Pre-denoise samples, exactly `info.sample_count` long.
    pub original: Vec<f32>,
    /// Post-denoise samples (crossfaded when overlap is enabled).
    pub processed: Vec<f32>,
}

type ChunkCallback = Box<dyn FnMut(&ProcessedChunk) + Send>;

/// Multi-buffer sample queue with partial-buffer consumption.
#[derive(Default)]
struct SampleQueue {
    buffers: VecDeque<Vec<f32>>,
    len: usize,
}

impl SampleQueue {
    fn push(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        self.len += samples.len();
        self.buffers.push_back(samples.to_vec());
    }

    /// Remove exactly `n` samples from the front, splitting the buffer the
    /// boundary lands in.  Caller guarantees `n <= self.len`.
    fn take(&mut self, n: usize) -> Vec<f32> {
        debug_assert!(n <= self.len);
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let mut buf = self.buffers.pop_front().unwrap();
            let needed = n - out.len();
            if buf.len() <= needed {
                out.extend_from_slice(&buf);
            } else {
                out.extend_from_slice(&buf[..needed]);
                buf.drain(..needed);
                self.buffers.push_front(buf);
            }
        }
        self.len -= n;
        out
    }

    fn clear(&mut self) {
        self.buffers.clear();
        self.len = 0;
    }
}

/// Splits a continuous processed stream into fixed-duration chunks.
pub struct ChunkProcessor {
    samples_per_chunk: usize,
    overlap_len: usize,
    original: SampleQueue,
    processed: SampleQueue,
    /// Tail of the previous processed chunk, kept for the crossfade.
    prev_tail: Vec<f32>,
    next_id: u64,
    emitted_samples: u64,
    callback: Option<ChunkCallback>,
}

impl ChunkProcessor {
    /// Create a processor cutting `duration_ms` chunks at 48 kHz with the
    /// given overlap fraction (`0.0` disables the crossfade; values are
    /// clamped to `[0.0, 0.5]`).
    pub fn new(duration_ms: u64, overlap: f32) -> Self {
        let samples_per_chunk = (duration_ms as usize * SAMPLE_RATE as usize / 1000).max(1);
        let overlap = if overlap.is_finite() {
            overlap.clamp(0.0, 0.5)
        } else {
            0.0
        };
        let overlap_len = (samples_per_chunk as f32 * overlap) as usize;
        Self {
            samples_per_chunk,
            overlap_len,
            original: SampleQueue::default(),
            processed: SampleQueue::default(),
            prev_tail: Vec::new(),
            next_id: 0,
            emitted_samples: 0,
            callback: None,
        }
    }

    /// Register the per-chunk callback, replacing any previous one.
    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&ProcessedChunk) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Samples per emitted chunk.
    pub fn samples_per_chunk(&self) -> usize {
        self.samples_per_chunk
    }

    /// Samples currently buffered toward the next chunk.
    pub fn buffered(&self) -> usize {
        self.processed.len
    }

    /// Accumulate one original/processed sample run and emit every chunk
    /// that becomes complete.  The two slices must be the same length.
    pub fn add_samples(&mut self, original: &[f32], processed: &[f32]) -> Vec<ProcessedChunk> {
        debug_assert_eq!(original.len(), processed.len());
        self.original.push(original);
        self.processed.push(processed);

        let mut chunks = Vec::new();
        while self.processed.len >= self.samples_per_chunk {
            chunks.push(self.emit_chunk());
        }
        chunks
    }

    /// Zero-pad the pending remainder into one final chunk and reset.
    /// Returns `None` (and touches nothing) when no samples are pending.
    pub fn flush(&mut self) -> Option<ProcessedChunk> {
        if self.processed.len == 0 {
            return None;
        }
        let pad = self.samples_per_chunk - self.processed.len;
        let zeros = vec![0.0_f32; pad];
        self.original.push(&zeros);
        self.processed.push(&zeros);
        let chunk = self.emit_chunk();
        self.reset();
        Some(chunk)
    }

    /// Drop all pending samples and crossfade state.  Counters keep running
    /// so chunk ids stay unique within the stream.
    pub fn reset(&mut self) {
        self.original.clear();
        self.processed.clear();
        self.prev_tail.clear();
    }

    fn emit_chunk(&mut self) -> ProcessedChunk {
        let original = self.original.take(self.samples_per_chunk);
        let mut processed = self.processed.take(self.samples_per_chunk);

        if self.overlap_len > 0 && !self.prev_tail.is_empty() {
            crossfade_head(&mut processed, &self.prev_tail);
        }
        if self.overlap_len > 0 {
            self.prev_tail = processed[processed.len() - self.overlap_len..].to_vec();
        }

        let original_rms = calculate_rms(&original);
        let processed_rms = calculate_rms(&processed);
        let noise_removed_pct = if original_rms > 0.0 {
            ((1.0 - processed_rms / original_rms) * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        let start_ms = self.emitted_samples as f64 / SAMPLE_RATE as f64 * 1000.0;
        self.emitted_samples += self.samples_per_chunk as u64;
        let end_ms = self.emitted_samples as f64 / SAMPLE_RATE as f64 * 1000.0;

        let chunk = ProcessedChunk {
            info: ChunkInfo {
                id: self.next_id,
                start_ms,
                end_ms,
                sample_count: self.samples_per_chunk,
                original_rms,
                processed_rms,
                original_peak: calculate_peak(&original),
                processed_peak: calculate_peak(&processed),
                noise_removed_pct,
            },
            original,
            processed,
        };
        self.next_id += 1;

        if let Some(callback) = self.callback.as_mut() {
            let result = catch_unwind(AssertUnwindSafe(|| callback(&chunk)));
            if result.is_err() {
                log::warn!("chunk callback panicked for chunk {}", chunk.info.id);
            }
        }

        chunk
    }
}

/// Linearly crossfade `tail` into the first `tail.len()` samples of
/// `chunk`.  At index `i` the incoming weight is `i / len` and the
/// outgoing weight is `1 - i / len`, so the pair always sums to 1.
fn crossfade_head(chunk: &mut [f32], tail: &[f32]) {
    let len = tail.len().min(chunk.len());
    for i in 0..len {
        let w_in = i as f32 / len as f32;
        let w_out = 1.0 - w_in;
        chunk[i] = chunk[i] * w_in + tail[i] * w_out;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// 10 ms chunks keep the numbers small: 480 samples per chunk.
    fn small_processor(overlap: f32) -> ChunkProcessor {
        ChunkProcessor::new(10, overlap)
    }

    // ---- Boundary arithmetic ----------------------------------------------------

    #[test]
    fn exact_multiple_yields_exact_chunk_count() {
        let mut p = small_processor(0.0);
        let n = p.samples_per_chunk();
        let samples = vec![0.25_f32; n * 3];

        let chunks = p.add_samples(&samples, &samples);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert_eq!(chunk.processed.len(), n);
        }
        assert_eq!(p.buffered(), 0);
    }

    #[test]
    fn remainder_stays_pending_until_flush() {
        let mut p = small_processor(0.0);
        let n = p.samples_per_chunk();
        let samples = vec![0.25_f32; n + 7];

        let chunks = p.add_samples(&samples, &samples);
        assert_eq!(chunks.len(), 1);
        assert_eq!(p.buffered(), 7);

        let last = p.flush().unwrap();
        assert_eq!(last.processed.len(), n);
        // Zero-padded past the 7 real samples.
        assert_eq!(last.processed[7], 0.0);
        assert_eq!(p.buffered(), 0);
    }

    #[test]
    fn boundary_inside_a_buffer_splits_it() {
        let mut p = small_processor(0.0);
        let n = p.samples_per_chunk();

        // Feed in two pieces so the second buffer straddles the boundary.
        let a: Vec<f32> = (0..n - 100).map(|i| i as f32).collect();
        let b: Vec<f32> = (n - 100..n + 50).map(|i| i as f32).collect();

        assert!(p.add_samples(&a, &a).is_empty());
        let chunks = p.add_samples(&b, &b);
        assert_eq!(chunks.len(), 1);

        // The chunk is the contiguous prefix; the remainder carries on.
        let chunk = &chunks[0].processed;
        assert_eq!(chunk[0], 0.0);
        assert_eq!(chunk[n - 1], (n - 1) as f32);
        assert_eq!(p.buffered(), 50);
    }

    #[test]
    fn small_feeds_accumulate_across_calls() {
        let mut p = small_processor(0.0);
        let n = p.samples_per_chunk();
        let piece = vec![0.1_f32; 60];

        let mut total = Vec::new();
        for _ in 0..(n / 60) {
            total.extend(p.add_samples(&piece, &piece));
        }
        assert_eq!(total.len(), 1);
    }

    // ---- Flush ------------------------------------------------------------------

    #[test]
    fn flush_with_nothing_pending_is_a_noop() {
        let mut p = small_processor(0.0);
        assert!(p.flush().is_none());

        // Counters untouched: the next chunk is still id 0.
        let n = p.samples_per_chunk();
        let samples = vec![0.5_f32; n];
        let chunks = p.add_samples(&samples, &samples);
        assert_eq!(chunks[0].info.id, 0);
    }

    #[test]
    fn flush_emits_at_most_one_chunk() {
        let mut p = small_processor(0.0);
        let samples = vec![0.5_f32; 10];
        p.add_samples(&samples, &samples);

        assert!(p.flush().is_some());
        assert!(p.flush().is_none());
    }

    // ---- Crossfade ----------------------------------------------------------------

    #[test]
    fn crossfade_weights_sum_to_one() {
        // DC input: if weights sum to 1 everywhere, a constant signal passes
        // through the crossfade unchanged.
        let mut p = small_processor(0.25);
        let n = p.samples_per_chunk();
        let samples = vec![0.5_f32; n * 3];

        let chunks = p.add_samples(&samples, &samples);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks[1..] {
            for &s in &chunk.processed {
                assert!((s - 0.5).abs() < 1e-6, "crossfade distorted DC: {s}");
            }
        }
    }

    #[test]
    fn overlap_does_not_change_chunk_length() {
        let mut with = small_processor(0.5);
        let mut without = small_processor(0.0);
        let n = with.samples_per_chunk();
        let samples = vec![0.3_f32; n * 2];

        let a = with.add_samples(&samples, &samples);
        let b = without.add_samples(&samples, &samples);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.processed.len(), y.processed.len());
        }
    }

    #[test]
    fn first_chunk_has_no_crossfade_partner() {
        let mut p = small_processor(0.25);
        let n = p.samples_per_chunk();
        let samples = vec![0.7_f32; n];

        let chunks = p.add_samples(&samples, &samples);
        assert_eq!(chunks[0].processed[0], 0.7);
    }

    // ---- Metrics -----------------------------------------------------------------

    #[test]
    fn chunk_info_reports_reduction_percentage() {
        let mut p = small_processor(0.0);
        let n = p.samples_per_chunk();
        let original = vec![0.8_f32; n];
        let processed = vec![0.2_f32; n];

        let chunks = p.add_samples(&original, &processed);
        let info = &chunks[0].info;
        assert!((info.original_rms - 0.8).abs() < 1e-5);
        assert!((info.processed_rms - 0.2).abs() < 1e-5);
        assert!((info.noise_removed_pct - 75.0).abs() < 1e-3);
        assert!((info.original_peak - 0.8).abs() < 1e-6);
    }

    #[test]
    fn silent_original_reports_zero_reduction() {
        let mut p = small_processor(0.0);
        let n = p.samples_per_chunk();
        let silence = vec![0.0_f32; n];

        let chunks = p.add_samples(&silence, &silence);
        assert_eq!(chunks[0].info.noise_removed_pct, 0.0);
    }

    #[test]
    fn chunk_positions_advance_by_duration() {
        let mut p = small_processor(0.0);
        let n = p.samples_per_chunk();
        let samples = vec![0.1_f32; n * 2];

        let chunks = p.add_samples(&samples, &samples);
        assert_eq!(chunks[0].info.id, 0);
        assert_eq!(chunks[1].info.id, 1);
        assert!((chunks[0].info.start_ms - 0.0).abs() < 1e-9);
        assert!((chunks[0].info.end_ms - 10.0).abs() < 1e-9);
        assert!((chunks[1].info.start_ms - 10.0).abs() < 1e-9);
    }

    // ---- Callback -------------------------------------------------------------------

    #[test]
    fn callback_fires_per_chunk() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);

        let mut p = small_processor(0.0);
        p.set_callback(move |_chunk| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        let n = p.samples_per_chunk();
        let samples = vec![0.1_f32; n * 2];
        p.add_samples(&samples, &samples);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_callback_does_not_poison_the_stream() {
        let mut p = small_processor(0.0);
        p.set_callback(|_chunk| panic!("listener bug"));

        let n = p.samples_per_chunk();
        let samples = vec![0.1_f32; n];
        let chunks = p.add_samples(&samples, &samples);
        assert_eq!(chunks.len(), 1);

        // Processing continues afterwards.
        let chunks = p.add_samples(&samples, &samples);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].info.id, 1);
    }
}
