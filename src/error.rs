//! Engine-wide error taxonomy.
//!
//! Every fallible public operation in the crate returns [`EngineError`].
//! Messages carry the offending values so callers (and log readers) never
//! need to reconstruct the failure from context.
//!
//! Two failure classes deserve a note:
//!
//! * [`EngineError::LoadTimeout`] is deliberately distinct from
//!   [`EngineError::InitializationFailed`] so callers can choose to retry a
//!   slow model load but give up on a broken one.
//! * Errors raised inside the per-buffer hot path are never allowed to
//!   escape into the audio callback — the session records them into a
//!   bounded history and emits silence instead (see `engine`).

use thiserror::Error;

use crate::audio::codec::FRAME_SIZE;

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// All errors that can arise from the noise-suppression engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// `initialize` was called on an engine that already left the
    /// `Uninitialized` state.
    #[error("engine already initialized (current state: {state})")]
    AlreadyInitialized { state: String },

    /// Environment check, context creation, or model load failed.
    #[error("initialization failed: {reason}")]
    InitializationFailed { reason: String },

    /// The model load did not complete within the configured timeout.
    ///
    /// Distinct from [`EngineError::InitializationFailed`] so callers can
    /// retry on slow networks/disks but not on genuine load failures.
    #[error("model load timed out after {waited_ms} ms")]
    LoadTimeout { waited_ms: u64 },

    /// Stream setup or per-frame processing failed.
    #[error("processing failed: {reason}")]
    ProcessingFailed { reason: String },

    /// A destroy-path step failed.  The engine still finishes tearing down;
    /// this error reports what went wrong along the way.
    #[error("cleanup failed: {reason}")]
    CleanupFailed { reason: String },

    /// Worker-pool creation or job submission failed.
    #[error("worker error: {reason}")]
    Worker { reason: String },

    /// A configuration field failed validation.
    #[error("invalid config: {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// An operation was attempted while the engine is not in a state that
    /// permits it.
    #[error("engine not ready: current state is {current} (requires one of [{required}])")]
    NotInitialized { current: String, required: String },

    /// A sample in the input buffer is NaN or infinite.  Never silently
    /// replaced — a non-finite sample upstream is always a caller defect.
    #[error("invalid sample at index {index}: {value} (samples must be finite)")]
    InvalidSample { index: usize, value: f32 },

    /// A frame handed to the denoiser is not exactly [`FRAME_SIZE`] samples.
    #[error("invalid frame length: {got} samples (frames must be exactly {expected})")]
    InvalidFrameLength { got: usize, expected: usize },

    /// WAV parse/validation failure.  The message names the exact
    /// unsupported parameter.
    #[error("unsupported audio format: {0}")]
    UnsupportedAudioFormat(String),
}

impl EngineError {
    /// Convenience constructor for the frame-length contract violation.
    pub fn bad_frame_length(got: usize) -> Self {
        EngineError::InvalidFrameLength {
            got,
            expected: FRAME_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_timeout_is_distinguishable_from_init_failure() {
        let timeout = EngineError::LoadTimeout { waited_ms: 5_000 };
        let failed = EngineError::InitializationFailed {
            reason: "no model".into(),
        };
        assert_ne!(timeout, failed);
        assert!(matches!(timeout, EngineError::LoadTimeout { .. }));
    }

    #[test]
    fn frame_length_error_names_both_lengths() {
        let err = EngineError::bad_frame_length(441);
        let msg = err.to_string();
        assert!(msg.contains("441"), "message: {msg}");
        assert!(msg.contains("480"), "message: {msg}");
    }

    #[test]
    fn invalid_sample_names_index() {
        let err = EngineError::InvalidSample {
            index: 17,
            value: f32::NAN,
        };
        assert!(err.to_string().contains("17"));
    }

    #[test]
    fn unsupported_format_carries_message() {
        let err = EngineError::UnsupportedAudioFormat("bit depth 8 (requires 16-bit)".into());
        assert!(err.to_string().contains("16-bit"));
    }

    #[test]
    fn not_initialized_names_current_and_required_states() {
        let err = EngineError::NotInitialized {
            current: "Uninitialized".into(),
            required: "Ready, Processing".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Uninitialized"), "message: {msg}");
        assert!(msg.contains("Ready"), "message: {msg}");
    }
}
