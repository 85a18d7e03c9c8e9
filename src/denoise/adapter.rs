//! Denoising engine adapter — model lifecycle and the single
//! `process_frame` entry point the sessions share.
//!
//! The adapter owns exactly one [`FrameProcessor`] instance and its fixed
//! per-frame buffers.  All sessions funnel through it serially (the engine
//! holds it behind a mutex), matching the single-shared-model resource
//! policy.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──initialize──▶ Loading ──▶ Ready
//!                                   │
//!                                   ├─ load error + degraded allowed ─▶ Degraded
//!                                   └─ load error / timeout ─▶ (Err, back to Uninitialized)
//! any state ──destroy──▶ Destroyed   (idempotent)
//! ```
//!
//! Loading races the [`ModelLoader`] against a caller-specified timeout;
//! a timeout surfaces as the distinct [`EngineError::LoadTimeout`] so
//! callers can retry slow loads but give up on broken ones.  After a
//! successful load the adapter runs a short warm-up pass of silent frames
//! to stabilize internal model state before the first real frame.

use async_trait::async_trait;
use std::time::Duration;

use crate::audio::codec::FRAME_SIZE;
use crate::error::EngineError;

use super::processor::{FrameOutput, FrameProcessor, NoiseGateProcessor, RnnoiseProcessor};

/// Silent frames pushed through a freshly loaded model before first use.
const WARMUP_FRAMES: usize = 10;

// ---------------------------------------------------------------------------
// ModelLoader
// ---------------------------------------------------------------------------

/// Asynchronous model-loading seam.
///
/// Production loaders construct the processor in-process; the seam exists
/// so bindings that fetch weights from disk or network can suspend, and so
/// tests can simulate slow or failing loads.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Verify the hard environment prerequisites before any load work.
    ///
    /// Bindings that need an audio context or an execution runtime fail
    /// fast here with a descriptive [`EngineError::InitializationFailed`].
    /// The default implementation accepts any environment.
    fn check_environment(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Load the model and return a ready processor.
    async fn load(&self) -> Result<Box<dyn FrameProcessor>, EngineError>;
}

/// Loads the in-process RNNoise model.
pub struct RnnoiseLoader;

#[async_trait]
impl ModelLoader for RnnoiseLoader {
    async fn load(&self) -> Result<Box<dyn FrameProcessor>, EngineError> {
        Ok(Box::new(RnnoiseProcessor::new()))
    }
}

/// Loads the energy gate as the *primary* algorithm
/// (`algorithm = "noise-gate"` in the configuration) — distinct from the
/// degraded-mode fallback, which uses the same processor type but is only
/// reached when an rnnoise load fails.
pub struct GateLoader {
    pub threshold: f32,
    pub attenuation: f32,
}

#[async_trait]
impl ModelLoader for GateLoader {
    async fn load(&self) -> Result<Box<dyn FrameProcessor>, EngineError> {
        Ok(Box::new(NoiseGateProcessor::new(
            self.threshold,
            self.attenuation,
        )))
    }
}

// ---------------------------------------------------------------------------
// AdapterStatus
// ---------------------------------------------------------------------------

/// Adapter lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterStatus {
    Uninitialized,
    Loading,
    Ready,
    /// Model load failed; running on the energy-gate fallback.
    Degraded,
    Destroyed,
}

impl AdapterStatus {
    /// Short label for diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            AdapterStatus::Uninitialized => "uninitialized",
            AdapterStatus::Loading => "loading",
            AdapterStatus::Ready => "ready",
            AdapterStatus::Degraded => "degraded",
            AdapterStatus::Destroyed => "destroyed",
        }
    }
}

// ---------------------------------------------------------------------------
// DenoiseAdapter
// ---------------------------------------------------------------------------

/// Owns the opaque model and exposes the engine's one
/// `process_frame(frame) → (output, voice_activity)` contract.
pub struct DenoiseAdapter {
    status: AdapterStatus,
    processor: Option<Box<dyn FrameProcessor>>,
    gate_threshold: f32,
    gate_attenuation: f32,
    frames_processed: u64,
}

impl DenoiseAdapter {
    /// Create an uninitialized adapter.  The gate parameters are kept so a
    /// degraded fallback can be built without re-reading configuration.
    pub fn new(gate_threshold: f32, gate_attenuation: f32) -> Self {
        Self {
            status: AdapterStatus::Uninitialized,
            processor: None,
            gate_threshold,
            gate_attenuation,
            frames_processed: 0,
        }
    }

    /// Initialize the adapter: environment check, timed model load,
    /// warm-up.
    ///
    /// On load failure or timeout with `allow_degraded` set, the adapter
    /// falls back to the energy gate and reports
    /// [`AdapterStatus::Degraded`]; otherwise the error propagates and the
    /// adapter returns to `Uninitialized` so a retry is possible.
    pub async fn initialize(
        &mut self,
        loader: &dyn ModelLoader,
        timeout_ms: u64,
        allow_degraded: bool,
    ) -> Result<AdapterStatus, EngineError> {
        if self.status != AdapterStatus::Uninitialized {
            return Err(EngineError::AlreadyInitialized {
                state: self.status.label().into(),
            });
        }

        if let Err(err) = loader.check_environment() {
            if allow_degraded {
                return Ok(self.enter_degraded(err.to_string()));
            }
            return Err(err);
        }

        self.status = AdapterStatus::Loading;

        let load = tokio::time::timeout(Duration::from_millis(timeout_ms), loader.load()).await;

        match load {
            Ok(Ok(processor)) => {
                self.processor = Some(processor);
                self.status = AdapterStatus::Ready;
                self.warm_up();
                Ok(AdapterStatus::Ready)
            }
            Ok(Err(err)) => {
                if allow_degraded {
                    Ok(self.enter_degraded(err.to_string()))
                } else {
                    self.status = AdapterStatus::Uninitialized;
                    Err(err)
                }
            }
            Err(_elapsed) => {
                let timeout_err = EngineError::LoadTimeout {
                    waited_ms: timeout_ms,
                };
                if allow_degraded {
                    Ok(self.enter_degraded(timeout_err.to_string()))
                } else {
                    self.status = AdapterStatus::Uninitialized;
                    Err(timeout_err)
                }
            }
        }
    }

    fn enter_degraded(&mut self, reason: String) -> AdapterStatus {
        log::warn!("model load failed, entering degraded mode: {reason}");
        self.processor = Some(Box::new(NoiseGateProcessor::new(
            self.gate_threshold,
            self.gate_attenuation,
        )));
        self.status = AdapterStatus::Degraded;
        self.warm_up();
        AdapterStatus::Degraded
    }

    /// Push silent frames through the fresh processor to stabilize model
    /// state.  Warm-up failures are logged, not fatal.
    fn warm_up(&mut self) {
        let silent = vec![0.0_f32; FRAME_SIZE];
        if let Some(processor) = self.processor.as_mut() {
            for i in 0..WARMUP_FRAMES {
                if let Err(err) = processor.process_frame(&silent) {
                    log::warn!("warm-up frame {i} failed: {err}");
                    break;
                }
            }
        }
    }

    /// Process one frame through the model.
    ///
    /// Validates the exact-480 contract before touching the processor and
    /// rejects any other length.
    pub fn process_frame(&mut self, frame: &[f32]) -> Result<FrameOutput, EngineError> {
        if frame.len() != FRAME_SIZE {
            return Err(EngineError::bad_frame_length(frame.len()));
        }

        let processor = match (&self.status, self.processor.as_mut()) {
            (AdapterStatus::Ready | AdapterStatus::Degraded, Some(p)) => p,
            _ => {
                return Err(EngineError::NotInitialized {
                    current: self.status.label().into(),
                    required: "ready, degraded".into(),
                })
            }
        };

        let output = processor.process_frame(frame)?;
        self.frames_processed += 1;
        Ok(output)
    }

    /// Tear the model down.  Safe to call any number of times; a second
    /// call is a no-op, never a crash.
    pub fn destroy(&mut self) {
        if self.status == AdapterStatus::Destroyed {
            return;
        }
        self.processor = None;
        self.status = AdapterStatus::Destroyed;
    }

    /// Current lifecycle status.
    pub fn status(&self) -> AdapterStatus {
        self.status
    }

    /// `true` while running on the energy-gate fallback.
    pub fn is_degraded(&self) -> bool {
        self.status == AdapterStatus::Degraded
    }

    /// Diagnostic name of the active processor, if any.
    pub fn processor_name(&self) -> Option<&'static str> {
        self.processor.as_ref().map(|p| p.name())
    }

    /// Total frames processed since initialization (warm-up excluded).
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Adapter pre-loaded with an arbitrary processor, already `Ready`.
    /// Lets the session and engine layers test the hot path without an
    /// async model load.
    #[cfg(test)]
    pub(crate) fn with_processor(processor: Box<dyn FrameProcessor>) -> Self {
        Self {
            status: AdapterStatus::Ready,
            processor: Some(processor),
            gate_threshold: 0.01,
            gate_attenuation: 0.1,
            frames_processed: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Test loaders
    // -----------------------------------------------------------------------

    /// Loader that always fails.
    struct FailingLoader;

    #[async_trait]
    impl ModelLoader for FailingLoader {
        async fn load(&self) -> Result<Box<dyn FrameProcessor>, EngineError> {
            Err(EngineError::InitializationFailed {
                reason: "weights missing".into(),
            })
        }
    }

    /// Loader that never completes within any reasonable timeout.
    struct SlowLoader;

    #[async_trait]
    impl ModelLoader for SlowLoader {
        async fn load(&self) -> Result<Box<dyn FrameProcessor>, EngineError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("slow loader should always be timed out");
        }
    }

    /// Loader whose environment check fails.
    struct NoEnvLoader;

    #[async_trait]
    impl ModelLoader for NoEnvLoader {
        fn check_environment(&self) -> Result<(), EngineError> {
            Err(EngineError::InitializationFailed {
                reason: "audio context unavailable".into(),
            })
        }

        async fn load(&self) -> Result<Box<dyn FrameProcessor>, EngineError> {
            unreachable!("environment check fails first");
        }
    }

    fn adapter() -> DenoiseAdapter {
        DenoiseAdapter::new(0.01, 0.1)
    }

    fn silent_frame() -> Vec<f32> {
        vec![0.0_f32; FRAME_SIZE]
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn successful_load_reaches_ready() {
        let mut a = adapter();
        let status = a.initialize(&RnnoiseLoader, 5_000, false).await.unwrap();
        assert_eq!(status, AdapterStatus::Ready);
        assert_eq!(a.processor_name(), Some("rnnoise"));
        // Warm-up ran before first real use.
        assert_eq!(a.frames_processed(), 0);
    }

    #[tokio::test]
    async fn double_initialize_is_rejected() {
        let mut a = adapter();
        a.initialize(&RnnoiseLoader, 5_000, false).await.unwrap();
        let err = a.initialize(&RnnoiseLoader, 5_000, false).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyInitialized { .. }));
    }

    #[tokio::test]
    async fn load_failure_without_degraded_propagates() {
        let mut a = adapter();
        let err = a.initialize(&FailingLoader, 5_000, false).await.unwrap_err();
        assert!(matches!(err, EngineError::InitializationFailed { .. }));
        // Retry is possible after failure.
        assert_eq!(a.status(), AdapterStatus::Uninitialized);
    }

    #[tokio::test]
    async fn load_failure_with_degraded_falls_back_to_gate() {
        let mut a = adapter();
        let status = a.initialize(&FailingLoader, 5_000, true).await.unwrap();
        assert_eq!(status, AdapterStatus::Degraded);
        assert!(a.is_degraded());
        assert_eq!(a.processor_name(), Some("noise-gate"));

        // Degraded mode still produces output.
        let out = a.process_frame(&silent_frame()).unwrap();
        assert_eq!(out.samples.len(), FRAME_SIZE);
    }

    #[tokio::test]
    async fn load_timeout_is_distinguishable() {
        let mut a = adapter();
        let err = a.initialize(&SlowLoader, 20, false).await.unwrap_err();
        assert!(
            matches!(err, EngineError::LoadTimeout { waited_ms: 20 }),
            "expected LoadTimeout, got: {err:?}"
        );
    }

    #[tokio::test]
    async fn load_timeout_with_degraded_falls_back() {
        let mut a = adapter();
        let status = a.initialize(&SlowLoader, 20, true).await.unwrap();
        assert_eq!(status, AdapterStatus::Degraded);
    }

    #[tokio::test]
    async fn failed_environment_check_fails_fast() {
        let mut a = adapter();
        let err = a.initialize(&NoEnvLoader, 5_000, false).await.unwrap_err();
        assert!(err.to_string().contains("audio context unavailable"));
    }

    // -----------------------------------------------------------------------
    // process_frame / destroy
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn process_before_initialize_is_rejected() {
        let mut a = adapter();
        let err = a.process_frame(&silent_frame()).unwrap_err();
        assert!(matches!(err, EngineError::NotInitialized { .. }));
    }

    #[tokio::test]
    async fn process_rejects_wrong_length_even_when_ready() {
        let mut a = adapter();
        a.initialize(&RnnoiseLoader, 5_000, false).await.unwrap();
        let err = a.process_frame(&[0.0; 100]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidFrameLength { got: 100, .. }));
    }

    #[tokio::test]
    async fn process_counts_frames() {
        let mut a = adapter();
        a.initialize(&RnnoiseLoader, 5_000, false).await.unwrap();
        for _ in 0..3 {
            a.process_frame(&silent_frame()).unwrap();
        }
        assert_eq!(a.frames_processed(), 3);
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let mut a = adapter();
        a.initialize(&RnnoiseLoader, 5_000, false).await.unwrap();

        a.destroy();
        assert_eq!(a.status(), AdapterStatus::Destroyed);
        a.destroy(); // second destroy is a no-op, not a crash
        assert_eq!(a.status(), AdapterStatus::Destroyed);

        let err = a.process_frame(&silent_frame()).unwrap_err();
        assert!(matches!(err, EngineError::NotInitialized { .. }));
    }

    #[tokio::test]
    async fn gate_loader_is_primary_algorithm_not_degraded() {
        let mut a = adapter();
        let status = a
            .initialize(
                &GateLoader {
                    threshold: 0.01,
                    attenuation: 0.1,
                },
                5_000,
                false,
            )
            .await
            .unwrap();
        assert_eq!(status, AdapterStatus::Ready);
        assert!(!a.is_degraded());
        assert_eq!(a.processor_name(), Some("noise-gate"));
    }
}
