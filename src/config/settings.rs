//! Engine settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::skin::VoiceSkin;

use super::AppPaths;

// ---------------------------------------------------------------------------
// TimingConfig
// ---------------------------------------------------------------------------

/// Timer durations used by the engine, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Silence after the last interim transcript before the pending utterance
    /// is finalized.
    pub silence_timeout_ms: u64,
    /// Debounce before a conversation capture session (re)starts.
    pub restart_debounce_ms: u64,
    /// Debounce before a standby (wake-phrase) capture session starts.
    pub standby_debounce_ms: u64,
    /// Backoff before restarting a capture session that the device ended
    /// without being asked to.
    pub error_backoff_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            silence_timeout_ms: 2_000,
            restart_debounce_ms: 300,
            standby_debounce_ms: 500,
            error_backoff_ms: 1_000,
        }
    }
}

// ---------------------------------------------------------------------------
// WakeConfig
// ---------------------------------------------------------------------------

/// Wake-phrase detection settings.
///
/// Phrases are matched case-insensitively as substrings of the running
/// transcript.  Note that the default set contains the bare word `"marco"`,
/// which will trigger on any speech containing that word — drop it here if
/// that proves too eager for your environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakeConfig {
    /// Trigger phrases, checked in order.
    pub phrases: Vec<String>,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            phrases: vec![
                "hey marco".into(),
                "wake up marco".into(),
                "wake up".into(),
                "system online".into(),
                "marco".into(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// VoiceCalibration
// ---------------------------------------------------------------------------

/// User-tuned pitch/rate pair applied by the `Personalized` voice skin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceCalibration {
    /// Calibrated pitch multiplier.
    pub pitch: f32,
    /// Calibrated speaking rate multiplier.
    pub rate: f32,
    /// Whether the calibration wizard has run.  When `false` the
    /// `Personalized` skin falls back to its neutral base parameters.
    pub is_calibrated: bool,
}

impl Default for VoiceCalibration {
    fn default() -> Self {
        Self {
            pitch: 1.0,
            rate: 1.0,
            is_calibrated: false,
        }
    }
}

// ---------------------------------------------------------------------------
// VoiceConfig
// ---------------------------------------------------------------------------

/// Speech synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Selected voice skin.
    pub skin: VoiceSkin,
    /// Calibration used by the `Personalized` skin.
    pub calibration: VoiceCalibration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            skin: VoiceSkin::RoboticGrunt,
            calibration: VoiceCalibration::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level engine configuration, serialised as `engine.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use marco_voice::config::EngineConfig;
///
/// // Load (returns Default when file is missing)
/// let config = EngineConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Name used to address the user in the boot-sequence greeting.
    pub master_name: String,
    /// Timer durations.
    pub timing: TimingConfig,
    /// Wake-phrase detection settings.
    pub wake: WakeConfig,
    /// Speech synthesis settings.
    pub voice: VoiceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            master_name: "Master".into(),
            timing: TimingConfig::default(),
            wake: WakeConfig::default(),
            voice: VoiceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the platform-appropriate `engine.toml`.
    ///
    /// Returns `Ok(EngineConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
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

    /// Save configuration to the platform-appropriate `engine.toml`,
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
