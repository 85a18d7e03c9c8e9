//! Real-time noise suppression for 48 kHz audio streams.
//!
//! # Architecture
//!
//! ```text
//! input buffer ──► FrameCodec ──► DenoiseAdapter ──► ChunkProcessor ──► chunks
//!  (any length)    (480-sample     (rnnoise model      (fixed-duration
//!                   frames)         or gate fallback)   chunks, crossfade)
//!                                        │
//!                                        ├──► MetricsAggregator ──► snapshots
//!                                        └──► RecordingManager ──► WAV blobs
//! ```
//!
//! [`engine::NoiseEngine`] is the public entry point: it owns the lifecycle
//! state machine, the single shared model instance, the active sessions
//! and the [`events::EventBus`] everything observable is announced on.
//!
//! # Quick start
//!
//! ```no_run
//! use stream_denoise::config::EngineConfig;
//! use stream_denoise::engine::NoiseEngine;
//! use stream_denoise::session::SessionOptions;
//!
//! # async fn demo() -> Result<(), stream_denoise::error::EngineError> {
//! let engine = NoiseEngine::new(EngineConfig::default());
//! engine.initialize().await?;
//!
//! let session = engine.start_session(SessionOptions::default())?;
//! let denoised = engine.process_buffer(session, &[0.0; 4800])?;
//! assert_eq!(denoised.len(), 4800);
//!
//! engine.stop_session(session)?;
//! engine.destroy(false).await?;
//! # Ok(())
//! # }
//! ```
//!
//! The per-buffer hot path ([`engine::NoiseEngine::process_buffer`]) is
//! synchronous and never blocks; only the lifecycle operations
//! (`initialize`, `destroy`, `process_file`) are async.

pub mod audio;
pub mod chunk;
pub mod config;
pub mod denoise;
pub mod engine;
pub mod error;
pub mod events;
pub mod metrics;
pub mod recording;
pub mod session;
pub mod wav;
pub mod workers;

pub use engine::{EngineRegistry, EngineState, NoiseEngine};
pub use error::EngineError;
pub use events::{EngineEvent, EventBus};
