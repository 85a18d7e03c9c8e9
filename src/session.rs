//! Per-stream processing session.
//!
//! # Hot path
//!
//! One [`StreamSession`] owns one stream's frame codec, chunk processor,
//! optional recording manager and pending-output queue.  Its
//! `process_buffer` is the real-time path: it runs synchronously inside
//! the audio callback budget, so it never blocks, never awaits and never
//! lets a frame failure escape — a failed frame becomes one frame of
//! silence, a dropped-frame count and an `ErrorOccurred` event, and the
//! stream keeps flowing.
//!
//! Output draining is under-run-safe: whatever the pending queue cannot
//! cover is zero-filled rather than blocking on more processed frames.
//!
//! The model itself is *not* owned here.  All sessions share the engine's
//! single [`DenoiseAdapter`] and their frame calls are serialized by the
//! engine's lock around it.

use std::collections::VecDeque;

use crate::audio::codec::{FrameCodec, FRAME_SIZE};
use crate::audio::level::{calculate_peak, calculate_power};
use crate::chunk::ChunkProcessor;
use crate::config::ChunkConfig;
use crate::denoise::DenoiseAdapter;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus};
use crate::metrics::MetricsAggregator;
use crate::recording::RecordingManager;

/// Engine-wide session identifier.
pub type SessionId = u64;

/// Per-session knobs supplied at `start_session`.
#[derive(Default)]
pub struct SessionOptions {
    /// Chunking override; `None` uses the engine configuration.
    pub chunk: Option<ChunkConfig>,
    /// Recording manager for this session; `None` disables recording.
    pub recording: Option<RecordingManager>,
}

/// One active stream and its processing state.
pub struct StreamSession {
    id: SessionId,
    codec: FrameCodec,
    chunker: ChunkProcessor,
    recorder: Option<RecordingManager>,
    /// Processed samples awaiting drain into output buffers.
    pending: VecDeque<f32>,
    paused: bool,
    frames_processed: u64,
    frames_dropped: u64,
}

impl StreamSession {
    pub fn new(id: SessionId, chunk: &ChunkConfig, recorder: Option<RecordingManager>) -> Self {
        Self {
            id,
            codec: FrameCodec::new(),
            chunker: ChunkProcessor::new(chunk.duration_ms as u64, chunk.overlap),
            recorder,
            pending: VecDeque::new(),
            paused: false,
            frames_processed: 0,
            frames_dropped: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Emit silence from the callback without rewiring the stream.
    pub fn pause(&mut self) {
        self.paused = true;
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.pause();
        }
    }

    pub fn resume(&mut self) {
        self.paused = false;
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.resume();
        }
    }

    /// Process one audio callback's buffer and return exactly
    /// `input.len()` output samples.
    ///
    /// `enabled = false` bypasses the pipeline entirely (clean passthrough
    /// for A/B toggling); a paused session returns silence.  Non-finite
    /// input samples are a caller defect and propagate as
    /// [`EngineError::InvalidSample`].
    pub fn process_buffer(
        &mut self,
        input: &[f32],
        adapter: &mut DenoiseAdapter,
        metrics: &MetricsAggregator,
        events: &EventBus,
        enabled: bool,
    ) -> Result<Vec<f32>, EngineError> {
        if self.paused {
            return Ok(vec![0.0; input.len()]);
        }

        metrics.update_input_level(calculate_peak(input));

        if !enabled {
            metrics.update_output_level(calculate_peak(input));
            return Ok(input.to_vec());
        }

        self.codec.add_samples(input)?;

        while let Some(frame) = self.codec.extract_frame() {
            let timestamp_ms = metrics.now_ms();

            match adapter.process_frame(&frame) {
                Ok(output) => {
                    self.frames_processed += 1;
                    metrics.record_frame(timestamp_ms);
                    metrics.update_vad(output.voice_activity);
                    metrics.update_output_level(calculate_peak(&output.samples));
                    metrics.update_noise_reduction(power_reduction_pct(
                        &frame,
                        &output.samples,
                    ));

                    for chunk in self.chunker.add_samples(&frame, &output.samples) {
                        metrics.record_chunk();
                        events.emit(&EngineEvent::ChunkReady(chunk.info));
                    }

                    if let Some(recorder) = self.recorder.as_mut() {
                        recorder.push(&frame, &output.samples);
                        if let Some(record) = recorder.maybe_cycle(timestamp_ms) {
                            events.emit(&EngineEvent::RecordingChunk(record));
                        }
                    }

                    self.pending.extend(output.samples);
                }
                Err(err) => {
                    self.frames_dropped += 1;
                    metrics.record_dropped_frame();
                    log::error!("session {}: frame dropped: {err}", self.id);
                    events.emit(&EngineEvent::ErrorOccurred(err.to_string()));
                    self.pending.extend(std::iter::repeat(0.0).take(FRAME_SIZE));
                }
            }
        }

        // Drain into an output buffer of exactly the input length,
        // zero-filling any under-run instead of blocking.
        let mut out = Vec::with_capacity(input.len());
        while out.len() < input.len() {
            out.push(self.pending.pop_front().unwrap_or(0.0));
        }
        Ok(out)
    }

    /// Finalize the session: flush the trailing partial chunk and stop the
    /// recorder so the in-flight tail is not lost.
    pub fn stop(&mut self, metrics: &MetricsAggregator, events: &EventBus) {
        if let Some(chunk) = self.chunker.flush() {
            metrics.record_chunk();
            events.emit(&EngineEvent::ChunkReady(chunk.info));
        }
        if let Some(recorder) = self.recorder.as_mut() {
            if let Some(record) = recorder.stop(metrics.now_ms()) {
                events.emit(&EngineEvent::RecordingChunk(record));
            }
        }
        self.codec.clear();
        self.pending.clear();
    }

    /// Hand the recorder back (its records outlive the session).
    pub fn take_recorder(&mut self) -> Option<RecordingManager> {
        self.recorder.take()
    }
}

/// Per-frame noise reduction as a direct power ratio, in percent.
fn power_reduction_pct(input: &[f32], output: &[f32]) -> f32 {
    let in_power = calculate_power(input);
    if in_power <= 0.0 {
        return 0.0;
    }
    let out_power = calculate_power(output);
    ((1.0 - out_power / in_power) * 100.0).clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
