//! Engine configuration: settings structs, validation, TOML persistence and
//! platform paths.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{ChunkConfig, EngineConfig, NoiseReductionLevel, ALLOWED_BUFFER_SIZES};
