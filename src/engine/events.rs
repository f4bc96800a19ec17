//! Event and identity types flowing through the engine's single channel.
//!
//! Everything that can influence the arbiter — public control calls, capture
//! device callbacks, playback completions, timer fires, dispatcher results —
//! arrives as one [`EngineEvent`] on one `mpsc` channel and is processed in
//! order by a single task.  That gives the engine its cooperative,
//! deterministic concurrency model: no transition ever interleaves with
//! another.
//!
//! Every event originating from an asynchronous source carries an identity
//! token ([`SessionId`], [`SequenceId`], [`RequestId`], [`TimerId`]).  The
//! arbiter compares the token against the current owner and silently drops
//! stale events — a late `SessionEnded` from a session the arbiter already
//! discarded must never drive a transition.

use thiserror::Error;

use crate::skin::VoiceSkin;

// ---------------------------------------------------------------------------
// Identity tokens
// ---------------------------------------------------------------------------

/// Identity of one capture session.  Monotonically increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Identity of one playback sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceId(pub u64);

/// Identity of one outstanding dispatcher request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// Identity of one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

// ---------------------------------------------------------------------------
// CaptureMode
// ---------------------------------------------------------------------------

/// Mode a capture session is started in; fixed for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Every finalized utterance is dispatched for a response.
    Conversation,
    /// Transcripts are scanned for wake phrases only.
    Standby,
}

// ---------------------------------------------------------------------------
// EndReason / CaptureErrorKind
// ---------------------------------------------------------------------------

/// Why a capture session ended, as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The caller asked for the stop.
    Requested,
    /// The device ended the session on its own (stream timeout, service
    /// recycle, …).
    Device,
}

/// Capture-device error taxonomy.
///
/// The arbiter absorbs ignorable errors silently and treats fatal ones as a
/// full stop requiring explicit user re-enablement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureErrorKind {
    /// No speech was detected before the device's internal timeout.
    #[error("no speech detected")]
    NoSpeech,

    /// The session was aborted by the caller or user.
    #[error("capture aborted")]
    Aborted,

    /// Microphone permission was denied.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// The capture device failed.
    #[error("capture device failure: {0}")]
    Device(String),

    /// The recognition service is unreachable.
    #[error("speech service network failure: {0}")]
    Network(String),
}

impl CaptureErrorKind {
    /// Ignorable errors produce no state change; recovery rides on the
    /// session's natural end event.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, CaptureErrorKind::NoSpeech | CaptureErrorKind::Aborted)
    }
}

// ---------------------------------------------------------------------------
// EngineEvent
// ---------------------------------------------------------------------------

/// Every input the arbiter can react to.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    // -- public control surface --------------------------------------------
    /// Toggle continuous conversation mode.
    SetConversationMode(bool),
    /// Toggle idle wake-phrase listening.
    SetWakeWordEnabled(bool),
    /// Switch the active voice skin; cancels any in-flight sequence.
    SetVoiceSkin(VoiceSkin),
    /// System-initiated speech, subject to the usual mutual exclusion.
    SpeakImmediate(String),
    /// Full teardown: cancel timers, stop capture and playback, exit.
    Shutdown,

    // -- capture session callbacks -----------------------------------------
    /// The device confirmed the session is live.
    SessionStarted(SessionId),
    /// Interim transcript for the in-progress utterance.
    PartialResult(SessionId, String),
    /// Device-final transcript segment.
    FinalResult(SessionId, String),
    /// The session is gone, for whatever reason.
    SessionEnded(SessionId, EndReason),
    /// The device reported an error; the session may still end separately.
    SessionError(SessionId, CaptureErrorKind),

    // -- playback callbacks ------------------------------------------------
    /// The chunk at `usize` finished playing.
    ChunkEnded(SequenceId, usize),
    /// The chunk at `usize` failed; the remaining queue is abandoned.
    ChunkError(SequenceId, usize, String),

    // -- microphone level meter --------------------------------------------
    /// Normalized amplitude sample in `0.0..=1.0`.
    MicLevel(f32),

    // -- internal ----------------------------------------------------------
    /// A scheduled timer fired.
    TimerFired(TimerId),
    /// The external dispatcher finished; `None` means no response text.
    ResponseReady(RequestId, Option<String>),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
