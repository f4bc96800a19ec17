//! Engine configuration: settings structs, TOML persistence, platform paths.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{EngineConfig, TimingConfig, VoiceCalibration, VoiceConfig, WakeConfig};
