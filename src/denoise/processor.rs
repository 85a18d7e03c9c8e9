//! Core frame-processor trait and implementations.
//!
//! # Overview
//!
//! [`FrameProcessor`] is the opaque model contract the rest of the engine
//! is written against: exactly 480 samples in, exactly 480 samples plus a
//! voice-activity probability out.
//!
//! [`RnnoiseProcessor`] is the production implementation wrapping the
//! `nnnoiseless` port of RNNoise (480-sample frames, 48 kHz, PCM16-range
//! floats at the binding boundary).
//!
//! [`NoiseGateProcessor`] is the degraded-mode fallback: a simple energy
//! gate that attenuates samples below an amplitude threshold and
//! synthesizes a voice-activity estimate from the mean rectified amplitude.
//! It exists so a failed model load can still produce *some* output when
//! the configuration allows degraded mode — a deliberate policy, not a bug.
//!
//! [`MockFrameProcessor`] (test-only) is a configurable passthrough used to
//! unit-test the session and engine layers without the real model.

use nnnoiseless::DenoiseState;

use crate::audio::codec::{ScalePolicy, FRAME_SIZE};
use crate::error::EngineError;

// ---------------------------------------------------------------------------
// FrameOutput / FrameProcessor
// ---------------------------------------------------------------------------

/// Result of one frame pass through the model.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    /// Exactly [`FRAME_SIZE`] denoised samples, normalized `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Voice-activity probability in `[0.0, 1.0]`.
    pub voice_activity: f32,
}

/// Object-safe interface for 480-sample frame processors.
///
/// # Contract
///
/// - `frame` must be exactly [`FRAME_SIZE`] normalized `f32` samples at
///   48 kHz; any other length is rejected with
///   [`EngineError::InvalidFrameLength`], never coerced.
/// - On success the output is always exactly [`FRAME_SIZE`] samples.
pub trait FrameProcessor: Send {
    /// Denoise one frame and report voice activity.
    fn process_frame(&mut self, frame: &[f32]) -> Result<FrameOutput, EngineError>;

    /// Short identifier for diagnostics (`"rnnoise"`, `"noise-gate"`, …).
    fn name(&self) -> &'static str;
}

// Compile-time assertion: Box<dyn FrameProcessor> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn FrameProcessor>) {}
};

/// Reject any frame that is not exactly [`FRAME_SIZE`] samples.
fn check_frame_length(frame: &[f32]) -> Result<(), EngineError> {
    if frame.len() != FRAME_SIZE {
        return Err(EngineError::bad_frame_length(frame.len()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// RnnoiseProcessor
// ---------------------------------------------------------------------------

/// Production denoiser wrapping `nnnoiseless::DenoiseState`.
///
/// The binding expects PCM16-range floats, so every frame is scaled by
/// ×32768 on the way in and ÷32768 on the way out
/// ([`ScalePolicy::Pcm16`]).  The two fixed one-frame scratch buffers are
/// allocated once at construction and reused for every call.
pub struct RnnoiseProcessor {
    state: Box<DenoiseState<'static>>,
    scale: ScalePolicy,
    /// Fixed input scratch buffer (one frame).
    in_buf: Vec<f32>,
    /// Fixed output scratch buffer (one frame).
    out_buf: Vec<f32>,
}

impl RnnoiseProcessor {
    /// Create a processor with fresh model state.
    pub fn new() -> Self {
        Self {
            state: DenoiseState::new(),
            scale: ScalePolicy::Pcm16,
            in_buf: vec![0.0; FRAME_SIZE],
            out_buf: vec![0.0; FRAME_SIZE],
        }
    }

    /// The scale policy applied at the binding boundary.
    pub fn scale_policy(&self) -> ScalePolicy {
        self.scale
    }
}

impl Default for RnnoiseProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameProcessor for RnnoiseProcessor {
    fn process_frame(&mut self, frame: &[f32]) -> Result<FrameOutput, EngineError> {
        check_frame_length(frame)?;

        self.in_buf.copy_from_slice(frame);
        self.scale.to_model(&mut self.in_buf);

        let vad = self.state.process_frame(&mut self.out_buf, &self.in_buf);

        let mut samples = self.out_buf.clone();
        self.scale.from_model(&mut samples);

        Ok(FrameOutput {
            samples,
            voice_activity: vad.clamp(0.0, 1.0),
        })
    }

    fn name(&self) -> &'static str {
        "rnnoise"
    }
}

// ---------------------------------------------------------------------------
// NoiseGateProcessor  (degraded mode)
// ---------------------------------------------------------------------------

/// Energy-gate fallback used when the model is unavailable.
///
/// Samples below `threshold` are multiplied by `attenuation`; everything
/// else passes through untouched.  Voice activity is synthesized from the
/// mean rectified amplitude of the frame.
///
/// The default constants (0.01 threshold, 0.1 attenuation) come from the
/// engine configuration, not from this type — see
/// [`crate::config::EngineConfig::gate_threshold`].
pub struct NoiseGateProcessor {
    threshold: f32,
    attenuation: f32,
}

impl NoiseGateProcessor {
    /// Create a gate with the given amplitude threshold and attenuation
    /// factor.
    pub fn new(threshold: f32, attenuation: f32) -> Self {
        Self {
            threshold,
            attenuation,
        }
    }
}

impl FrameProcessor for NoiseGateProcessor {
    fn process_frame(&mut self, frame: &[f32]) -> Result<FrameOutput, EngineError> {
        check_frame_length(frame)?;

        let samples: Vec<f32> = frame
            .iter()
            .map(|&s| {
                if s.abs() < self.threshold {
                    s * self.attenuation
                } else {
                    s
                }
            })
            .collect();

        // Mean rectified amplitude, mapped so that an average level of 0.1
        // (clear speech on a typical microphone) saturates to full activity.
        let mean_abs = frame.iter().map(|s| s.abs()).sum::<f32>() / FRAME_SIZE as f32;
        let voice_activity = (mean_abs / 0.1).clamp(0.0, 1.0);

        Ok(FrameOutput {
            samples,
            voice_activity,
        })
    }

    fn name(&self) -> &'static str {
        "noise-gate"
    }
}

// ---------------------------------------------------------------------------
// MockFrameProcessor  (test-only)
// ---------------------------------------------------------------------------

/// A test double with a fixed gain and voice-activity response.
///
/// Enforces the exact-480 contract like the real processors so callers are
/// tested against it.
#[cfg(test)]
pub struct MockFrameProcessor {
    /// Gain applied to every sample (1.0 = passthrough).
    pub gain: f32,
    /// Voice activity reported for every frame.
    pub vad: f32,
    /// When set, every call fails with `ProcessingFailed`.
    pub fail: bool,
}

#[cfg(test)]
impl MockFrameProcessor {
    /// Passthrough processor reporting the given voice activity.
    pub fn passthrough(vad: f32) -> Self {
        Self {
            gain: 1.0,
            vad,
            fail: false,
        }
    }

    /// Processor that scales every sample by `gain`.
    pub fn with_gain(gain: f32, vad: f32) -> Self {
        Self {
            gain,
            vad,
            fail: false,
        }
    }

    /// Processor that fails every call.
    pub fn failing() -> Self {
        Self {
            gain: 1.0,
            vad: 0.0,
            fail: true,
        }
    }
}

#[cfg(test)]
impl FrameProcessor for MockFrameProcessor {
    fn process_frame(&mut self, frame: &[f32]) -> Result<FrameOutput, EngineError> {
        check_frame_length(frame)?;
        if self.fail {
            return Err(EngineError::ProcessingFailed {
                reason: "mock failure".into(),
            });
        }
        Ok(FrameOutput {
            samples: frame.iter().map(|s| s * self.gain).collect(),
            voice_activity: self.vad,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
