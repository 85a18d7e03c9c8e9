//! Fixed-size frame extraction and model-boundary scale conversion.
//!
//! The denoising model consumes exactly [`FRAME_SIZE`] samples (10 ms at
//! 48 kHz) per call, but platform audio callbacks deliver buffers of
//! arbitrary length (commonly 1024 or 4096 samples).  [`FrameCodec`]
//! bridges the two: callers append whatever the callback delivered and pop
//! whole frames — never a partial one.
//!
//! [`ScalePolicy`] makes the model's numeric contract explicit.  The
//! rnnoise family expects PCM16-range floats (±32768) at the boundary;
//! other bindings take normalized floats directly.  Picking the wrong
//! policy silently degrades output quality, so it is a typed parameter with
//! a tested round trip.

use std::collections::VecDeque;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Samples per model frame: 10 ms at 48 kHz.
pub const FRAME_SIZE: usize = 480;

/// The only sample rate the model accepts.
pub const SAMPLE_RATE: u32 = 48_000;

/// Scale factor between normalized floats and the PCM16-equivalent range.
pub const PCM16_SCALE: f32 = 32_768.0;

// ---------------------------------------------------------------------------
// ScalePolicy
// ---------------------------------------------------------------------------

/// Numeric contract at the model boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalePolicy {
    /// The binding takes normalized floats in `[-1.0, 1.0]` directly.
    Normalized,
    /// The binding expects PCM16-range floats: input ×32768, output ÷32768.
    /// This is the contract of the rnnoise-family model used here.
    Pcm16,
}

impl ScalePolicy {
    /// Convert normalized samples to the model's expected range, in place.
    pub fn to_model(self, samples: &mut [f32]) {
        if self == ScalePolicy::Pcm16 {
            for s in samples {
                *s *= PCM16_SCALE;
            }
        }
    }

    /// Convert model output back to normalized samples, in place.
    pub fn from_model(self, samples: &mut [f32]) {
        if self == ScalePolicy::Pcm16 {
            for s in samples {
                *s /= PCM16_SCALE;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// Accumulates variable-length sample buffers and yields exact
/// [`FRAME_SIZE`]-sample frames in FIFO order.
///
/// # Example
///
/// ```rust
/// use stream_denoise::audio::codec::{FrameCodec, FRAME_SIZE};
///
/// let mut codec = FrameCodec::new();
/// codec.add_samples(&vec![0.0_f32; 700]).unwrap();
///
/// let frame = codec.extract_frame().expect("one whole frame buffered");
/// assert_eq!(frame.len(), FRAME_SIZE);
/// assert_eq!(codec.buffered(), 220); // remainder stays queued
/// assert!(codec.extract_frame().is_none());
/// ```
#[derive(Debug, Default)]
pub struct FrameCodec {
    queue: VecDeque<f32>,
}

impl FrameCodec {
    /// Create an empty codec.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::with_capacity(FRAME_SIZE * 4),
        }
    }

    /// Append `samples` to the accumulation queue.
    ///
    /// Supports repeated calls with different lengths.  Every sample is
    /// validated: a NaN or infinite value is a hard
    /// [`EngineError::InvalidSample`] naming the offending index, and
    /// nothing from the rejected buffer is enqueued.
    pub fn add_samples(&mut self, samples: &[f32]) -> Result<(), EngineError> {
        for (index, &value) in samples.iter().enumerate() {
            if !value.is_finite() {
                return Err(EngineError::InvalidSample { index, value });
            }
        }
        self.queue.extend(samples.iter().copied());
        Ok(())
    }

    /// Number of samples currently buffered.
    pub fn buffered(&self) -> usize {
        self.queue.len()
    }

    /// `true` when at least one whole frame can be extracted.
    pub fn has_frame(&self) -> bool {
        self.queue.len() >= FRAME_SIZE
    }

    /// Pop exactly [`FRAME_SIZE`] samples, or `None` when fewer are
    /// buffered.  Never returns a partial frame.
    pub fn extract_frame(&mut self) -> Option<Vec<f32>> {
        if !self.has_frame() {
            return None;
        }
        Some(self.queue.drain(..FRAME_SIZE).collect())
    }

    /// Drain whatever remains (< [`FRAME_SIZE`] samples, or more if whole
    /// frames were never popped).  Used by the final flush, which zero-pads
    /// the tail deliberately — the only place a short frame is ever padded.
    pub fn take_remainder(&mut self) -> Vec<f32> {
        self.queue.drain(..).collect()
    }

    /// Discard all buffered samples.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Accumulation / extraction ------------------------------------------

    #[test]
    fn extract_requires_full_frame() {
        let mut codec = FrameCodec::new();
        codec.add_samples(&vec![0.1_f32; FRAME_SIZE - 1]).unwrap();
        assert!(!codec.has_frame());
        assert!(codec.extract_frame().is_none());

        codec.add_samples(&[0.1]).unwrap();
        assert!(codec.has_frame());
        assert_eq!(codec.extract_frame().unwrap().len(), FRAME_SIZE);
    }

    #[test]
    fn variable_length_appends_accumulate() {
        let mut codec = FrameCodec::new();
        codec.add_samples(&vec![0.0_f32; 100]).unwrap();
        codec.add_samples(&vec![0.0_f32; 250]).unwrap();
        codec.add_samples(&vec![0.0_f32; 200]).unwrap();
        assert_eq!(codec.buffered(), 550);

        assert!(codec.extract_frame().is_some());
        assert_eq!(codec.buffered(), 70);
    }

    #[test]
    fn frames_preserve_fifo_order() {
        let mut codec = FrameCodec::new();
        let input: Vec<f32> = (0..FRAME_SIZE * 2).map(|i| i as f32 / 1000.0).collect();
        codec.add_samples(&input).unwrap();

        let first = codec.extract_frame().unwrap();
        let second = codec.extract_frame().unwrap();
        assert_eq!(first[..], input[..FRAME_SIZE]);
        assert_eq!(second[..], input[FRAME_SIZE..]);
    }

    #[test]
    fn single_large_buffer_yields_multiple_frames() {
        let mut codec = FrameCodec::new();
        codec.add_samples(&vec![0.0_f32; 4096]).unwrap();

        let mut frames = 0;
        while codec.extract_frame().is_some() {
            frames += 1;
        }
        assert_eq!(frames, 4096 / FRAME_SIZE); // 8 whole frames
        assert_eq!(codec.buffered(), 4096 % FRAME_SIZE); // 256 left over
    }

    // ---- Validation ----------------------------------------------------------

    #[test]
    fn nan_sample_is_rejected_with_index() {
        let mut codec = FrameCodec::new();
        let mut samples = vec![0.0_f32; 10];
        samples[7] = f32::NAN;

        let err = codec.add_samples(&samples).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSample { index: 7, .. }));
        // Nothing from the rejected buffer may have been enqueued.
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn infinite_sample_is_rejected() {
        let mut codec = FrameCodec::new();
        let err = codec.add_samples(&[0.0, f32::INFINITY]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSample { index: 1, .. }));
    }

    // ---- Remainder / clear ----------------------------------------------------

    #[test]
    fn take_remainder_drains_partial_tail() {
        let mut codec = FrameCodec::new();
        codec.add_samples(&vec![0.2_f32; FRAME_SIZE + 120]).unwrap();
        let _ = codec.extract_frame();

        let tail = codec.take_remainder();
        assert_eq!(tail.len(), 120);
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn clear_resets_queue() {
        let mut codec = FrameCodec::new();
        codec.add_samples(&vec![0.0_f32; 600]).unwrap();
        codec.clear();
        assert_eq!(codec.buffered(), 0);
        assert!(codec.extract_frame().is_none());
    }

    // ---- ScalePolicy -----------------------------------------------------------

    #[test]
    fn normalized_policy_is_identity() {
        let mut samples = vec![0.5_f32, -0.25, 1.0];
        let original = samples.clone();
        ScalePolicy::Normalized.to_model(&mut samples);
        ScalePolicy::Normalized.from_model(&mut samples);
        assert_eq!(samples, original);
    }

    #[test]
    fn pcm16_to_model_scales_by_32768() {
        let mut samples = vec![1.0_f32, -1.0, 0.5];
        ScalePolicy::Pcm16.to_model(&mut samples);
        assert_eq!(samples, vec![32_768.0, -32_768.0, 16_384.0]);
    }

    /// Round-trip fidelity across the full normalized range: within 1e-3
    /// for all samples in [-1, 1].
    #[test]
    fn pcm16_round_trip_within_tolerance() {
        let mut samples: Vec<f32> = (0..=2_000)
            .map(|i| (i as f32 / 1_000.0) - 1.0) // -1.0 ..= 1.0
            .collect();
        let original = samples.clone();

        ScalePolicy::Pcm16.to_model(&mut samples);
        ScalePolicy::Pcm16.from_model(&mut samples);

        for (a, b) in original.iter().zip(samples.iter()) {
            assert!((a - b).abs() < 1e-3, "round trip drift: {a} vs {b}");
        }
    }
}
