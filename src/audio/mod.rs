//! Audio plumbing — capture, frame codec, level measurement, resampling.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → stereo_to_mono
//!           → resample_to_48k → FrameCodec (480-sample frames)
//!           → DenoiseAdapter → ChunkProcessor / RecordingManager
//! ```

pub mod capture;
pub mod codec;
pub mod level;
pub mod resample;

pub use capture::{AudioChunk, AudioInput, CaptureError, StreamHandle};
pub use codec::{FrameCodec, ScalePolicy, FRAME_SIZE, PCM16_SCALE, SAMPLE_RATE};
pub use level::{calculate_peak, calculate_power, calculate_rms};
pub use resample::{resample, resample_to_48k, stereo_to_mono};
