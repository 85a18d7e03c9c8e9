//! The noise-suppression engine.
//!
//! # Overview
//!
//! [`NoiseEngine`] ties the whole pipeline together: the lifecycle state
//! machine gates every public operation, the single shared
//! [`DenoiseAdapter`] serializes all frame processing (the model's native
//! buffers are one shared resource), sessions own their per-stream state,
//! and everything observable flows out through the [`EventBus`].
//!
//! The engine is `Clone`; clones share one inner state, so a clone can be
//! handed to the capture thread, the idle-cleanup task and the caller at
//! the same time.
//!
//! # Lifecycle
//!
//! ```text
//! new → initialize().await → Ready (or Degraded)
//!     → start_session / process_buffer / process_file
//!     → stop_session → Ready (idle-cleanup timer arms here)
//!     → destroy().await → Destroyed
//! ```
//!
//! Errors raised inside the per-buffer hot path never escape the audio
//! callback: they become silence plus an entry in a bounded error history
//! (see [`StreamSession`]).

pub mod registry;
pub mod state;

pub use registry::EngineRegistry;
pub use state::{EngineState, StateMachine};

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use crate::audio::capture::{AudioInput, StreamHandle};
use crate::audio::codec::{FRAME_SIZE, SAMPLE_RATE};
use crate::audio::resample::{resample_to_48k, stereo_to_mono};
use crate::config::EngineConfig;
use crate::denoise::{DenoiseAdapter, GateLoader, ModelLoader, RnnoiseLoader};
use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus, SubscriptionId};
use crate::metrics::{MetricsAggregator, MetricsSnapshot, DEFAULT_UPDATE_INTERVAL_MS};
use crate::recording::{BlobRegistry, RecordingManager};
use crate::session::{SessionId, SessionOptions, StreamSession};
use crate::wav::{encode_wav, parse_wav};
use crate::workers::WorkerPool;

/// Hot-path errors retained for diagnostics.
const MAX_ERROR_HISTORY: usize = 10;

struct EngineInner {
    config: EngineConfig,
    enabled: AtomicBool,
    events: EventBus,
    state: Mutex<StateMachine>,
    adapter: Mutex<DenoiseAdapter>,
    sessions: Mutex<HashMap<SessionId, StreamSession>>,
    next_session_id: AtomicU64,
    metrics: Arc<MetricsAggregator>,
    errors: Arc<Mutex<VecDeque<String>>>,
    blobs: Arc<BlobRegistry>,
    workers: Mutex<Option<WorkerPool>>,
    cleanup_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    /// Captured during `initialize` so sync paths (session stop) can arm
    /// the idle-cleanup timer.
    runtime: Mutex<Option<tokio::runtime::Handle>>,
}

/// Clonable handle to one engine instance.
#[derive(Clone)]
pub struct NoiseEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for NoiseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseEngine").finish_non_exhaustive()
    }
}

impl NoiseEngine {
    /// Build an engine around `config`.  Nothing is allocated or validated
    /// until [`NoiseEngine::initialize`].
    pub fn new(config: EngineConfig) -> Self {
        let events = EventBus::new();
        let errors = Arc::new(Mutex::new(VecDeque::new()));

        // Every ErrorOccurred event lands in the bounded history, no matter
        // which session or layer raised it.
        let history = Arc::clone(&errors);
        events.subscribe(move |event| {
            if let EngineEvent::ErrorOccurred(message) = event {
                let mut history = history.lock().unwrap();
                if history.len() == MAX_ERROR_HISTORY {
                    history.pop_front();
                }
                history.push_back(message.clone());
            }
        });

        let enabled = config.enabled;
        let adapter = DenoiseAdapter::new(config.gate_threshold, config.gate_attenuation);

        Self {
            inner: Arc::new(EngineInner {
                config,
                enabled: AtomicBool::new(enabled),
                state: Mutex::new(StateMachine::new(events.clone())),
                events,
                adapter: Mutex::new(adapter),
                sessions: Mutex::new(HashMap::new()),
                next_session_id: AtomicU64::new(1),
                metrics: Arc::new(MetricsAggregator::new()),
                errors,
                blobs: Arc::new(BlobRegistry::new()),
                workers: Mutex::new(None),
                cleanup_task: Mutex::new(None),
                runtime: Mutex::new(None),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Initialize the engine: validate configuration, allocate the
    /// processing context, load and warm up the model.
    ///
    /// Returns the resulting state: `Ready`, or `Degraded` when the model
    /// load failed and the configuration allows the fallback.  Calling
    /// this on an already-initialized engine fails with
    /// [`EngineError::AlreadyInitialized`]; re-initializing from the
    /// `Error` state is allowed.
    pub async fn initialize(&self) -> Result<EngineState, EngineError> {
        let loader: Box<dyn ModelLoader> = match self.inner.config.algorithm.as_str() {
            "noise-gate" => Box::new(GateLoader {
                threshold: self.inner.config.gate_threshold,
                attenuation: self.inner.config.gate_attenuation,
            }),
            _ => Box::new(RnnoiseLoader),
        };
        self.initialize_with_loader(loader.as_ref()).await
    }

    /// Initialization body with an explicit loader (tests inject failing
    /// and hanging loaders here).
    pub(crate) async fn initialize_with_loader(
        &self,
        loader: &dyn ModelLoader,
    ) -> Result<EngineState, EngineError> {
        {
            let state = self.inner.state.lock().unwrap();
            let current = state.current();
            if current != EngineState::Uninitialized && current != EngineState::Error {
                return Err(EngineError::AlreadyInitialized {
                    state: current.to_string(),
                });
            }
        }

        if let Err(err) = self.inner.config.validate() {
            self.enter_error_state();
            return Err(err);
        }

        *self.inner.runtime.lock().unwrap() = Some(tokio::runtime::Handle::current());
        self.transition(EngineState::Initializing);

        // Processing context: worker pool and the periodic metrics push.
        self.transition(EngineState::CreatingContext);
        if self.inner.config.use_workers {
            *self.inner.workers.lock().unwrap() =
                Some(WorkerPool::new(self.inner.config.worker_threads));
        }
        self.inner
            .metrics
            .start_auto_update(DEFAULT_UPDATE_INTERVAL_MS, self.inner.events.clone());

        // Model load and warm-up.  The adapter is built locally so no lock
        // is held across the await.
        self.transition(EngineState::LoadingModel);
        let mut adapter = DenoiseAdapter::new(
            self.inner.config.gate_threshold,
            self.inner.config.gate_attenuation,
        );
        let status = adapter
            .initialize(
                loader,
                self.inner.config.load_timeout_ms,
                self.inner.config.allow_degraded,
            )
            .await;

        if let Err(err) = status {
            self.enter_error_state();
            self.inner
                .events
                .emit(&EngineEvent::ErrorOccurred(err.to_string()));
            return Err(err);
        }

        let degraded = adapter.is_degraded();
        *self.inner.adapter.lock().unwrap() = adapter;

        let end_state = if degraded {
            self.transition(EngineState::Degraded);
            self.inner.events.emit(&EngineEvent::DegradedMode {
                reason: "model load failed; energy-gate fallback active".into(),
            });
            EngineState::Degraded
        } else {
            self.transition(EngineState::Ready);
            self.inner.events.emit(&EngineEvent::Initialized);
            EngineState::Ready
        };

        log::info!(
            "engine initialized: state={end_state} processor={:?}",
            self.inner.adapter.lock().unwrap().processor_name()
        );

        self.arm_idle_cleanup();
        Ok(end_state)
    }

    /// Tear the engine down: stop every session, destroy the model,
    /// shut the worker pool down, release every blob.
    ///
    /// With `force` set, individual session-stop failures are logged and
    /// teardown continues; without it, a collected failure surfaces as
    /// [`EngineError::CleanupFailed`] after teardown still completed.
    /// Destroying a destroyed (or never-initialized) engine is a no-op.
    pub async fn destroy(&self, force: bool) -> Result<(), EngineError> {
        {
            let state = self.inner.state.lock().unwrap();
            match state.current() {
                EngineState::Destroyed | EngineState::Destroying => return Ok(()),
                EngineState::Uninitialized => return Ok(()),
                _ => {}
            }
        }

        let mut stop_errors = Vec::new();
        let ids: Vec<SessionId> = self.inner.sessions.lock().unwrap().keys().copied().collect();
        for id in ids {
            if let Err(err) = self.stop_session(id) {
                log::error!("destroy: stopping session {id} failed: {err}");
                stop_errors.push(format!("session {id}: {err}"));
            }
        }

        self.transition(EngineState::Destroying);

        self.cancel_idle_cleanup();
        self.inner.metrics.stop_auto_update();
        self.inner.adapter.lock().unwrap().destroy();
        if let Some(mut pool) = self.inner.workers.lock().unwrap().take() {
            pool.shutdown();
        }
        self.inner.blobs.release_all();

        self.transition(EngineState::Destroyed);
        self.inner.events.emit(&EngineEvent::Destroyed);
        log::info!("engine destroyed");

        if !force && !stop_errors.is_empty() {
            return Err(EngineError::CleanupFailed {
                reason: stop_errors.join("; "),
            });
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.inner.state.lock().unwrap().current()
    }

    /// `true` while running on the energy-gate fallback.
    pub fn is_degraded(&self) -> bool {
        self.inner.adapter.lock().unwrap().is_degraded()
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Start a stream session.  Requires `Ready`, `Degraded` or an already
    /// processing engine; the first session moves the engine to
    /// `Processing` and cancels any pending idle-cleanup timer.
    pub fn start_session(&self, options: SessionOptions) -> Result<SessionId, EngineError> {
        self.inner.state.lock().unwrap().require(&[
            EngineState::Ready,
            EngineState::Degraded,
            EngineState::Processing,
            EngineState::Paused,
        ])?;

        self.cancel_idle_cleanup();

        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let chunk = options.chunk.unwrap_or(self.inner.config.chunk);
        let recorder = options.recording.map(|mut recorder| {
            recorder.start(self.inner.metrics.now_ms());
            recorder
        });

        let mut sessions = self.inner.sessions.lock().unwrap();
        let first = sessions.is_empty();
        sessions.insert(id, StreamSession::new(id, &chunk, recorder));
        drop(sessions);

        if first {
            self.transition(EngineState::Processing);
            self.inner.events.emit(&EngineEvent::ProcessingStarted);
        }
        log::debug!("session {id} started");
        Ok(id)
    }

    /// Hot path: process one audio callback's buffer through `session_id`.
    ///
    /// Frame processing across all sessions is serialized on the single
    /// shared adapter.  Returns exactly `input.len()` samples.
    pub fn process_buffer(
        &self,
        session_id: SessionId,
        input: &[f32],
    ) -> Result<Vec<f32>, EngineError> {
        self.inner
            .state
            .lock()
            .unwrap()
            .require(&[EngineState::Processing, EngineState::Paused])?;

        let mut sessions = self.inner.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| EngineError::ProcessingFailed {
                reason: format!("unknown session id {session_id}"),
            })?;

        let mut adapter = self.inner.adapter.lock().unwrap();
        session.process_buffer(
            input,
            &mut adapter,
            &self.inner.metrics,
            &self.inner.events,
            self.inner.enabled.load(Ordering::Relaxed),
        )
    }

    /// Pause one session.  When every session is paused the engine state
    /// follows to `Paused`.
    pub fn pause_session(&self, session_id: SessionId) -> Result<(), EngineError> {
        let mut sessions = self.inner.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| EngineError::ProcessingFailed {
                reason: format!("unknown session id {session_id}"),
            })?;
        session.pause();

        let all_paused = sessions.values().all(|s| s.is_paused());
        drop(sessions);
        if all_paused {
            self.transition(EngineState::Paused);
        }
        Ok(())
    }

    pub fn resume_session(&self, session_id: SessionId) -> Result<(), EngineError> {
        let mut sessions = self.inner.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| EngineError::ProcessingFailed {
                reason: format!("unknown session id {session_id}"),
            })?;
        session.resume();
        drop(sessions);

        if self.state() == EngineState::Paused {
            self.transition(EngineState::Processing);
        }
        Ok(())
    }

    /// Stop a session: flush its trailing chunk, finalize its recording,
    /// remove it.  Stopping the last session returns the engine to `Ready`
    /// and arms the idle-cleanup timer.
    pub fn stop_session(&self, session_id: SessionId) -> Result<(), EngineError> {
        let mut sessions = self.inner.sessions.lock().unwrap();
        let mut session =
            sessions
                .remove(&session_id)
                .ok_or_else(|| EngineError::ProcessingFailed {
                    reason: format!("unknown session id {session_id}"),
                })?;
        let last = sessions.is_empty();
        drop(sessions);

        session.stop(&self.inner.metrics, &self.inner.events);
        log::debug!("session {session_id} stopped");

        if last {
            self.transition(EngineState::Ready);
            self.inner.events.emit(&EngineEvent::ProcessingEnded);
            self.arm_idle_cleanup();
        }
        Ok(())
    }

    /// Number of active sessions.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().unwrap().len()
    }

    /// Start a session fed by the default input device.
    ///
    /// A dedicated thread drains the capture channel, downmixes and
    /// resamples to 48 kHz mono, and runs the hot path.  Dropping the
    /// returned [`StreamHandle`] stops the capture.
    pub fn start_capture_session(
        &self,
        options: SessionOptions,
    ) -> Result<(SessionId, StreamHandle), EngineError> {
        let session_id = self.start_session(options)?;

        let input = AudioInput::new(Some(self.inner.config.buffer_size))?;
        let (tx, rx) = mpsc::channel();
        let handle = input.start(tx)?;

        let engine = self.clone();
        std::thread::Builder::new()
            .name("denoise-capture".into())
            .spawn(move || {
                while let Ok(chunk) = rx.recv() {
                    let mono = stereo_to_mono(&chunk.samples, chunk.channels);
                    let mono = resample_to_48k(&mono, chunk.sample_rate);
                    match engine.process_buffer(session_id, &mono) {
                        Ok(_processed) => {}
                        Err(err) => {
                            log::error!("capture session {session_id}: {err}");
                            break;
                        }
                    }
                }
                log::debug!("capture thread for session {session_id} exiting");
            })
            .map_err(|err| EngineError::ProcessingFailed {
                reason: format!("failed to spawn capture thread: {err}"),
            })?;

        Ok((session_id, handle))
    }

    // -----------------------------------------------------------------------
    // Batch file path
    // -----------------------------------------------------------------------

    /// Denoise a whole WAV file (PCM16 mono) and return the processed file
    /// as PCM16 mono 48 kHz WAV bytes.
    ///
    /// Non-48 kHz input is resampled first.  The trailing partial frame is
    /// zero-padded through the model and trimmed back, so the output length
    /// equals the (resampled) input length.
    pub async fn process_file(&self, wav_bytes: &[u8]) -> Result<Vec<u8>, EngineError> {
        self.inner.state.lock().unwrap().require(&[
            EngineState::Ready,
            EngineState::Processing,
            EngineState::Degraded,
        ])?;

        let audio = parse_wav(wav_bytes)?;
        let samples = resample_to_48k(&audio.samples, audio.sample_rate);

        let mut output = Vec::with_capacity(samples.len());
        let mut adapter = self.inner.adapter.lock().unwrap();

        for frame in samples.chunks(FRAME_SIZE) {
            let result = if frame.len() == FRAME_SIZE {
                adapter.process_frame(frame)?
            } else {
                let mut padded = frame.to_vec();
                padded.resize(FRAME_SIZE, 0.0);
                let mut out = adapter.process_frame(&padded)?;
                out.samples.truncate(frame.len());
                out
            };
            self.inner.metrics.record_frame(self.inner.metrics.now_ms());
            self.inner.metrics.update_vad(result.voice_activity);
            output.extend_from_slice(&result.samples);
        }
        drop(adapter);

        log::info!(
            "processed file: {} samples at {} Hz -> {} samples at {SAMPLE_RATE} Hz",
            audio.samples.len(),
            audio.sample_rate,
            output.len()
        );
        Ok(encode_wav(&output, SAMPLE_RATE))
    }

    // -----------------------------------------------------------------------
    // Consumer surface
    // -----------------------------------------------------------------------

    /// The engine's event channel.
    pub fn events(&self) -> EventBus {
        self.inner.events.clone()
    }

    /// Subscribe to the periodic metrics push only.
    pub fn on_metrics_update<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&MetricsSnapshot) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(move |event| {
            if let EngineEvent::MetricsUpdated(snapshot) = event {
                callback(snapshot);
            }
        })
    }

    /// Current metrics snapshot (pull-style; see also
    /// [`NoiseEngine::on_metrics_update`]).
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Toggle processing without tearing the graph down: a disabled engine
    /// passes input through untouched (A/B comparison).
    pub fn update_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
        log::debug!("processing enabled: {enabled}");
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    /// Recent hot-path errors, oldest first (bounded history).
    pub fn error_history(&self) -> Vec<String> {
        self.inner.errors.lock().unwrap().iter().cloned().collect()
    }

    /// Blob store holding recorded chunk payloads.
    pub fn blobs(&self) -> Arc<BlobRegistry> {
        Arc::clone(&self.inner.blobs)
    }

    /// Build a recording manager wired to this engine's blob registry,
    /// ready to pass into [`SessionOptions::recording`].
    pub fn new_recording_manager(
        &self,
        config: crate::recording::RecordingConfig,
    ) -> RecordingManager {
        RecordingManager::new(config, Arc::clone(&self.inner.blobs))
    }

    /// Encode samples to WAV off the audio thread when the worker pool is
    /// enabled, inline otherwise, and hand the bytes to `on_done`.
    pub fn encode_wav_async<F>(&self, samples: Vec<f32>, on_done: F) -> Result<(), EngineError>
    where
        F: FnOnce(Vec<u8>) + Send + 'static,
    {
        let job = move || on_done(encode_wav(&samples, SAMPLE_RATE));
        match self.inner.workers.lock().unwrap().as_ref() {
            Some(pool) => pool.execute(job),
            None => {
                job();
                Ok(())
            }
        }
    }

    /// One JSON blob with everything a bug report needs.
    pub fn diagnostics(&self) -> serde_json::Value {
        let adapter = self.inner.adapter.lock().unwrap();
        serde_json::json!({
            "state": self.state().to_string(),
            "enabled": self.is_enabled(),
            "algorithm": self.inner.config.algorithm,
            "processor": adapter.processor_name(),
            "degraded": adapter.is_degraded(),
            "adapter_frames": adapter.frames_processed(),
            "sessions": self.session_count(),
            "blobs": self.inner.blobs.len(),
            "workers": self.inner.workers.lock().unwrap().as_ref().map(|p| p.size()),
            "errors": self.error_history(),
            "metrics": self.inner.metrics.snapshot().to_json(),
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn transition(&self, target: EngineState) {
        self.inner.state.lock().unwrap().transition_to(target);
    }

    fn enter_error_state(&self) {
        self.inner.state.lock().unwrap().transition_to(EngineState::Error);
    }

    /// Arm the idle-destroy timer when configured and the engine sits at
    /// `Ready`/`Degraded` with zero sessions.  An engine that initializes
    /// but never processes is destroyed after the idle window; that is the
    /// intended resource-safety behaviour.
    fn arm_idle_cleanup(&self) {
        if !self.inner.config.auto_cleanup {
            return;
        }
        if self.session_count() != 0 {
            return;
        }
        let Some(runtime) = self.inner.runtime.lock().unwrap().clone() else {
            return;
        };

        let delay = self.inner.config.cleanup_delay_ms;
        let engine = self.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            log::info!("idle for {delay} ms with no sessions, destroying engine");
            // Clear the slot first so destroy's own cancel pass does not
            // abort the task that is running it.
            engine.inner.cleanup_task.lock().unwrap().take();
            if let Err(err) = engine.destroy(true).await {
                log::error!("idle cleanup destroy failed: {err}");
            }
        });

        let mut slot = self.inner.cleanup_task.lock().unwrap();
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    fn cancel_idle_cleanup(&self) {
        if let Some(task) = self.inner.cleanup_task.lock().unwrap().take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
