//! Engine configuration structs, defaults, validation and TOML persistence.
//!
//! [`EngineConfig`] is captured once at `initialize` time and is read-only
//! afterwards, with one deliberate exception: the enable/disable toggle
//! ([`crate::engine::NoiseEngine::update_enabled`]).  Changing any other
//! field requires destroying and re-creating the engine — a config update
//! never reconfigures active audio topology.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

use super::AppPaths;

// ---------------------------------------------------------------------------
// NoiseReductionLevel
// ---------------------------------------------------------------------------

/// Aggressiveness of the noise suppression.
///
/// `Auto` lets the model's own voice-activity output drive the behaviour;
/// the fixed levels bias the degraded-mode gate threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiseReductionLevel {
    Low,
    Medium,
    High,
    Auto,
}

impl Default for NoiseReductionLevel {
    fn default() -> Self {
        Self::Auto
    }
}

// ---------------------------------------------------------------------------
// ChunkConfig
// ---------------------------------------------------------------------------

/// Settings for fixed-duration chunking of the processed stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Target chunk duration in milliseconds.
    pub duration_ms: u32,
    /// Crossfade overlap as a fraction of the chunk length (0.0 – 0.5).
    /// Zero disables the crossfade entirely.
    pub overlap: f32,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            duration_ms: 5_000,
            overlap: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig  (top-level)
// ---------------------------------------------------------------------------

/// Audio buffer sizes the platform layer is allowed to request.
pub const ALLOWED_BUFFER_SIZES: [usize; 5] = [256, 512, 1024, 2048, 4096];

/// Top-level engine configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use stream_denoise::config::EngineConfig;
///
/// // Load (returns Default when file is missing)
/// let config = EngineConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Log verbosity passed to the logger at startup (`error`, `warn`,
    /// `info`, `debug`, `trace`).
    pub log_level: String,

    /// Noise-reduction aggressiveness.
    pub noise_reduction: NoiseReductionLevel,

    /// Audio buffer size requested from the platform; must be one of
    /// [`ALLOWED_BUFFER_SIZES`].
    pub buffer_size: usize,

    /// Denoising algorithm selector: `"rnnoise"` (neural model) or
    /// `"noise-gate"` (pure energy gate, no model load).
    pub algorithm: String,

    /// When `true`, an idle engine (state `Ready`, zero sessions) destroys
    /// itself after [`cleanup_delay_ms`](Self::cleanup_delay_ms).  This is
    /// intentional resource-safety behaviour for long-lived host processes,
    /// not a bug: an engine that initializes but never processes is torn
    /// down automatically.
    pub auto_cleanup: bool,

    /// Idle window before auto-cleanup fires, in milliseconds.
    pub cleanup_delay_ms: u64,

    /// Dispatch chunk events off the audio thread through the worker pool.
    pub use_workers: bool,

    /// Worker pool size when [`use_workers`](Self::use_workers) is set.
    pub worker_threads: usize,

    /// Allow the engine to fall back to the energy-gate processor when the
    /// model load fails, instead of failing initialization.
    pub allow_degraded: bool,

    /// Maximum time to wait for the model load before giving up.
    pub load_timeout_ms: u64,

    /// Degraded-mode gate: samples below this amplitude are attenuated.
    pub gate_threshold: f32,

    /// Degraded-mode gate: attenuation factor applied below the threshold.
    pub gate_attenuation: f32,

    /// Default chunking settings for sessions that request chunked output.
    pub chunk: ChunkConfig,

    /// Master enable toggle — the only field that may change after
    /// initialization.  When `false`, sessions pass audio through
    /// unprocessed.
    pub enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            noise_reduction: NoiseReductionLevel::default(),
            buffer_size: 1024,
            algorithm: "rnnoise".into(),
            auto_cleanup: false,
            cleanup_delay_ms: 30_000,
            use_workers: false,
            worker_threads: 2,
            allow_degraded: true,
            load_timeout_ms: 5_000,
            gate_threshold: 0.01,
            gate_attenuation: 0.1,
            chunk: ChunkConfig::default(),
            enabled: true,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration.
    ///
    /// Called once by `NoiseEngine::initialize`; the returned
    /// [`EngineError::InvalidConfig`] names the offending field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !ALLOWED_BUFFER_SIZES.contains(&self.buffer_size) {
            return Err(EngineError::InvalidConfig {
                field: "buffer_size",
                reason: format!(
                    "{} is not one of the allowed sizes {ALLOWED_BUFFER_SIZES:?}",
                    self.buffer_size
                ),
            });
        }

        if self.algorithm != "rnnoise" && self.algorithm != "noise-gate" {
            return Err(EngineError::InvalidConfig {
                field: "algorithm",
                reason: format!(
                    "unknown algorithm {:?} (expected \"rnnoise\" or \"noise-gate\")",
                    self.algorithm
                ),
            });
        }

        if !(0.0..=0.5).contains(&self.chunk.overlap) {
            return Err(EngineError::InvalidConfig {
                field: "chunk.overlap",
                reason: format!("{} is outside [0.0, 0.5]", self.chunk.overlap),
            });
        }

        if self.chunk.duration_ms == 0 {
            return Err(EngineError::InvalidConfig {
                field: "chunk.duration_ms",
                reason: "chunk duration must be > 0".into(),
            });
        }

        if self.use_workers && self.worker_threads == 0 {
            return Err(EngineError::InvalidConfig {
                field: "worker_threads",
                reason: "worker pool enabled with zero threads".into(),
            });
        }

        if self.auto_cleanup && self.cleanup_delay_ms == 0 {
            return Err(EngineError::InvalidConfig {
                field: "cleanup_delay_ms",
                reason: "auto-cleanup enabled with zero delay".into(),
            });
        }

        if !self.gate_threshold.is_finite() || !(0.0..1.0).contains(&self.gate_threshold) {
            return Err(EngineError::InvalidConfig {
                field: "gate_threshold",
                reason: format!("{} is outside [0.0, 1.0)", self.gate_threshold),
            });
        }

        if !self.gate_attenuation.is_finite() || !(0.0..=1.0).contains(&self.gate_attenuation) {
            return Err(EngineError::InvalidConfig {
                field: "gate_attenuation",
                reason: format!("{} is outside [0.0, 1.0]", self.gate_attenuation),
            });
        }

        if self.load_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig {
                field: "load_timeout_ms",
                reason: "load timeout must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(EngineConfig::default())` when the file does not exist
    /// yet (first-run scenario) so callers never need to special-case a
    /// missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
