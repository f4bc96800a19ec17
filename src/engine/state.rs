//! Engine phases and the shared observable snapshot.
//!
//! [`Phase`] drives the arbiter's state machine.  The UI reads the engine via
//! [`SharedState`] — a cheap-to-clone `Arc<Mutex<EngineSnapshot>>` that the
//! arbiter updates on every transition.

use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// States of the voice arbiter.
///
/// ```text
/// Idle ──wake word on──▶ Standby ──wake phrase──▶ (boot) ──▶ Listening
///      ──conversation on─────────────────────────────────▶ Listening
///
/// Listening ──utterance finalized──▶ Suspended ──response spoken──▶ Listening
/// Standby / Listening ──device-ended session──▶ ErrorBackoff ──▶ same mode
/// any capturing state ──fatal capture error──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No capture, no playback, nothing scheduled.
    Idle,

    /// A capture session is live in wake-phrase mode.
    Standby,

    /// A capture session is live in conversation mode.
    Listening,

    /// Capture intentionally stopped while playback or dispatch runs, or
    /// while a restart debounce is pending.
    Suspended,

    /// A capture session ended without being asked to; a restart in the same
    /// mode is scheduled.
    ErrorBackoff,
}

impl Phase {
    /// Returns `true` while a capture session is live.
    pub fn is_capturing(&self) -> bool {
        matches!(self, Phase::Standby | Phase::Listening)
    }

    /// A short human-readable label suitable for display in a status line.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Standby => "Standby",
            Phase::Listening => "Listening",
            Phase::Suspended => "Suspended",
            Phase::ErrorBackoff => "Backoff",
        }
    }
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Idle
    }
}

// ---------------------------------------------------------------------------
// EngineSnapshot
// ---------------------------------------------------------------------------

/// Observable engine state — everything the UI layer needs.
///
/// The arbiter mutates it; consumers read it.  Lock for a short critical
/// section only; do **not** hold the lock across `.await` points.
#[derive(Debug, Clone, Default)]
pub struct EngineSnapshot {
    /// Current arbiter phase.
    pub phase: Phase,

    /// `true` while a conversation-mode capture session is live.
    pub is_listening: bool,

    /// `true` while a playback sequence is in flight.
    ///
    /// Never `true` at the same time as `is_listening` — capture and playback
    /// are strictly mutually exclusive.
    pub is_speaking: bool,

    /// Latest interim transcript of the pending utterance, for live display.
    pub interim_text: String,

    /// Normalized microphone amplitude in `0.0..=1.0`, `0.0` when no session
    /// is live or the level meter is unavailable.
    pub mic_volume: f32,

    /// Message for the single user-visible notification raised by a fatal
    /// capture error.  Cleared when a mode is re-enabled.
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`EngineSnapshot`].
pub type SharedState = Arc<Mutex<EngineSnapshot>>;

/// Construct a new [`SharedState`] wrapping a default [`EngineSnapshot`].
pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(EngineSnapshot::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
