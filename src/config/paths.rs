//! Cross-platform engine paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\stream-denoise\
//!   macOS:   ~/Library/Application Support/stream-denoise/
//!   Linux:   ~/.config/stream-denoise/
//!
//! Data dir (recorded chunk exports):
//!   Windows: %LOCALAPPDATA%\stream-denoise\
//!   macOS:   ~/Library/Application Support/stream-denoise/
//!   Linux:   ~/.local/share/stream-denoise/

use std::path::PathBuf;

/// Holds all resolved engine directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for exported chunk recordings.
    pub exports_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "stream-denoise";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path (should be extremely rare in practice).
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let exports_dir = data_dir.join("exports");

        Self {
            config_dir,
            settings_file,
            exports_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
