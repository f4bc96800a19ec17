//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (engine settings):
//!   Windows: %APPDATA%\marco-voice\
//!   macOS:   ~/Library/Application Support/marco-voice/
//!   Linux:   ~/.config/marco-voice/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `engine.toml`.
    pub config_dir: PathBuf,
    /// Full path to `engine.toml`.
    pub settings_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "marco-voice";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path (should be extremely rare in practice).
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("engine.toml");

        Self {
            config_dir,
            settings_file,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
