//! Adapter seams between the engine and its platform collaborators.
//!
//! The engine owns no audio or network code.  Speech capture, speech
//! playback, microphone metering, and response generation are behind these
//! traits; implementations post their results back onto the engine channel as
//! [`EngineEvent`]s, which keeps every outcome flowing through the same
//! ordered loop.
//!
//! ```text
//!               start/stop                    events
//!   arbiter ───────────────▶ CaptureAdapter ─────────▶ engine channel
//!               speak/cancel
//!   arbiter ───────────────▶ PlaybackAdapter ────────▶ engine channel
//!               dispatch (awaited in a spawned task)
//!   arbiter ───────────────▶ ResponseDispatcher
//! ```

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::engine::{CaptureErrorKind, CaptureMode, EngineEvent, SequenceId, SessionId, SpokenChunk};

#[cfg(test)]
pub mod mock;

// ---------------------------------------------------------------------------
// CaptureAdapter
// ---------------------------------------------------------------------------

/// Speech-capture device (microphone plus recognizer).
///
/// At most one session is live at a time; the arbiter guarantees it calls
/// [`stop`](CaptureAdapter::stop) before starting a new session.  The adapter
/// reports everything about the session — confirmation, transcripts, errors,
/// and the terminal `SessionEnded` — through `events`, tagged with the
/// `session` id it was started with.
#[async_trait]
pub trait CaptureAdapter: Send + Sync {
    /// Begin capturing.  A synchronous start failure is returned here;
    /// anything that happens after the device accepts the session arrives as
    /// events.
    async fn start(
        &self,
        session: SessionId,
        mode: CaptureMode,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<(), CaptureErrorKind>;

    /// Stop the current session, if any.  The adapter must still deliver
    /// `SessionEnded` for it (with `EndReason::Requested`).
    async fn stop(&self);
}

// ---------------------------------------------------------------------------
// PlaybackAdapter
// ---------------------------------------------------------------------------

/// Speech synthesis output.
///
/// The arbiter keeps at most one chunk in flight and waits for `ChunkEnded`
/// or `ChunkError` (tagged with `sequence` and the chunk index) before
/// submitting the next.
#[async_trait]
pub trait PlaybackAdapter: Send + Sync {
    /// Synthesize and play one chunk.
    async fn speak(
        &self,
        sequence: SequenceId,
        chunk: SpokenChunk,
        events: mpsc::Sender<EngineEvent>,
    );

    /// Discard anything queued or playing.  Cancelled chunks must not emit
    /// end events.
    async fn cancel_all(&self);
}

// ---------------------------------------------------------------------------
// MicLevelAdapter
// ---------------------------------------------------------------------------

/// Optional microphone amplitude meter, used for UI level displays.
///
/// Levels arrive as [`EngineEvent::MicLevel`] samples in `0.0..=1.0`.
#[async_trait]
pub trait MicLevelAdapter: Send + Sync {
    /// Start streaming level samples onto the engine channel.
    async fn subscribe(&self, events: mpsc::Sender<EngineEvent>) -> anyhow::Result<()>;

    /// Stop streaming.
    async fn unsubscribe(&self);
}

// ---------------------------------------------------------------------------
// ResponseDispatcher
// ---------------------------------------------------------------------------

/// Downstream consumer of finalized utterances.
///
/// The arbiter awaits this in a spawned task so a slow dispatcher never
/// blocks the event loop.  `Ok(None)` means the utterance was consumed but
/// produced nothing to speak.
#[async_trait]
pub trait ResponseDispatcher: Send + Sync {
    async fn dispatch(&self, utterance: &str) -> anyhow::Result<Option<String>>;
}
