//! Voice skins — per-skin playback parameters for synthesized speech.
//!
//! A [`VoiceSkin`] is a named bundle of synthesis parameters (pitch, rate,
//! preferred voice language/gender, optional per-chunk jitter).  The playback
//! sequencer asks the active skin's [`VoiceSkinProfile`] for a fresh
//! [`PlaybackParams`] before every chunk, so skins with jitter re-roll their
//! parameters per sentence.
//!
//! Jitter is a pure function of `(profile, rng)`; pass a seeded
//! [`rand::rngs::StdRng`] for deterministic output in tests.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::VoiceCalibration;

// ---------------------------------------------------------------------------
// VoiceSkin
// ---------------------------------------------------------------------------

/// All selectable voice skins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceSkin {
    /// Neutral assistant voice.
    ClassicAi,
    /// Low-pitched robotic voice — the default.
    RoboticGrunt,
    /// Slightly raised pitch, softer pacing.
    SoftAssistant,
    /// Fast, clipped delivery.
    CyberHacker,
    /// Very low pitch, deliberate pacing.
    DeepProtocol,
    /// Uses the user's [`VoiceCalibration`] instead of fixed parameters.
    Personalized,
    /// Chaotic pitch/rate re-rolled on every chunk.
    GlitchEntity,
    /// Extremely fast delivery.
    HyperVelocity,
    /// Near-subsonic drone.
    VoidWalker,
    /// Measured, British-English preference.
    RoyalGuard,
    /// Bright system-announcer voice.
    SystemPrime,
    /// Precise butler voice with a slight organic pitch variance per chunk.
    IronModulation,
}

impl VoiceSkin {
    /// The static parameter profile for this skin.
    pub fn profile(self) -> VoiceSkinProfile {
        match self {
            VoiceSkin::ClassicAi => VoiceSkinProfile::fixed(1.0, 1.0, &["en-GB", "en-US"])
                .gender(Gender::Male),
            VoiceSkin::RoboticGrunt => {
                VoiceSkinProfile::fixed(0.6, 1.0, &["en-US"]).gender(Gender::Male)
            }
            VoiceSkin::SoftAssistant => VoiceSkinProfile::fixed(1.1, 0.95, &["en-US", "en-GB"])
                .gender(Gender::Female),
            VoiceSkin::CyberHacker => VoiceSkinProfile::fixed(0.85, 1.25, &["en-US"]),
            VoiceSkin::DeepProtocol => {
                VoiceSkinProfile::fixed(0.4, 1.1, &["en-US"]).gender(Gender::Male)
            }
            VoiceSkin::Personalized => {
                VoiceSkinProfile::fixed(1.0, 1.0, &["en-US", "en-GB"]).calibrated()
            }
            VoiceSkin::GlitchEntity => {
                VoiceSkinProfile::fixed(1.0, 1.0, &["en-US"]).jitter(Jitter::Chaotic)
            }
            VoiceSkin::HyperVelocity => VoiceSkinProfile::fixed(1.1, 1.6, &["en-US"]),
            VoiceSkin::VoidWalker => {
                VoiceSkinProfile::fixed(0.1, 0.7, &["en-US"]).gender(Gender::Male)
            }
            VoiceSkin::RoyalGuard => {
                VoiceSkinProfile::fixed(0.9, 0.9, &["en-GB"]).gender(Gender::Male)
            }
            VoiceSkin::SystemPrime => {
                VoiceSkinProfile::fixed(1.05, 1.05, &["en-US"]).gender(Gender::Female)
            }
            VoiceSkin::IronModulation => VoiceSkinProfile::fixed(0.9, 1.05, &["en-GB", "en-US"])
                .gender(Gender::Male)
                .jitter(Jitter::Subtle),
        }
    }
}

impl Default for VoiceSkin {
    fn default() -> Self {
        VoiceSkin::RoboticGrunt
    }
}

// ---------------------------------------------------------------------------
// Gender / Jitter
// ---------------------------------------------------------------------------

/// Preferred synthesized-voice gender, when the platform can honour it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

/// Per-chunk parameter variance applied on top of the base pitch/rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// Fixed parameters on every chunk.
    None,
    /// Pitch in `0.5..1.5`, rate in `0.8..1.2`, re-rolled per chunk.
    Chaotic,
    /// Base pitch plus or minus up to `0.025` per chunk.
    Subtle,
}

// ---------------------------------------------------------------------------
// VoiceSkinProfile
// ---------------------------------------------------------------------------

/// Static per-skin parameters, read-only to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSkinProfile {
    /// Base pitch multiplier.
    pub base_pitch: f32,
    /// Base speaking-rate multiplier.
    pub base_rate: f32,
    /// Preferred voice language tags, most preferred first.
    pub lang_preference: &'static [&'static str],
    /// Preferred voice gender, if any.
    pub gender_preference: Option<Gender>,
    /// Per-chunk variance applied on top of the base parameters.
    pub jitter: Jitter,
    /// When set, this text replaces every chunk's spoken content
    /// (theatrical skins).
    pub override_text: Option<String>,
    /// When `true` and the user's calibration is complete, the calibrated
    /// pitch/rate replace the base values (`Personalized` skin).
    pub use_calibration: bool,
}

impl VoiceSkinProfile {
    fn fixed(pitch: f32, rate: f32, langs: &'static [&'static str]) -> Self {
        Self {
            base_pitch: pitch,
            base_rate: rate,
            lang_preference: langs,
            gender_preference: None,
            jitter: Jitter::None,
            override_text: None,
            use_calibration: false,
        }
    }

    fn gender(mut self, g: Gender) -> Self {
        self.gender_preference = Some(g);
        self
    }

    fn jitter(mut self, j: Jitter) -> Self {
        self.jitter = j;
        self
    }

    fn calibrated(mut self) -> Self {
        self.use_calibration = true;
        self
    }

    /// Returns a copy of this profile with a fixed spoken-text override.
    pub fn with_override(mut self, text: impl Into<String>) -> Self {
        self.override_text = Some(text.into());
        self
    }

    /// Build the playback parameters for one chunk.
    ///
    /// Re-evaluated per chunk so jittered skins vary sentence to sentence.
    pub fn params_for_chunk(
        &self,
        calibration: &VoiceCalibration,
        rng: &mut impl Rng,
    ) -> PlaybackParams {
        let (mut pitch, mut rate) = if self.use_calibration && calibration.is_calibrated {
            (calibration.pitch, calibration.rate)
        } else {
            (self.base_pitch, self.base_rate)
        };

        match self.jitter {
            Jitter::None => {}
            Jitter::Chaotic => {
                pitch = 0.5 + rng.gen::<f32>();
                rate = 0.8 + rng.gen::<f32>() * 0.4;
            }
            Jitter::Subtle => {
                pitch += (rng.gen::<f32>() - 0.5) * 0.05;
            }
        }

        PlaybackParams {
            pitch,
            rate,
            lang_preference: self.lang_preference,
            gender_preference: self.gender_preference,
        }
    }

    /// The text actually spoken for a chunk — the profile's override when
    /// present, otherwise the chunk itself.
    pub fn spoken_text<'a>(&'a self, chunk: &'a str) -> &'a str {
        self.override_text.as_deref().unwrap_or(chunk)
    }
}

// ---------------------------------------------------------------------------
// PlaybackParams
// ---------------------------------------------------------------------------

/// Fully-resolved synthesis parameters for one playback chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackParams {
    pub pitch: f32,
    pub rate: f32,
    pub lang_preference: &'static [&'static str],
    pub gender_preference: Option<Gender>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
