//! The voice interaction engine.
//!
//! One [`VoiceArbiter`] task owns all engine state and consumes a single
//! [`EngineEvent`] channel fed by the control handle, the adapters, and the
//! engine's own timers.  Submodules, leaf-first:
//!
//! * [`timer`] — cancellable delayed event delivery.
//! * [`events`] — the event enum and identity tokens.
//! * [`state`] — phases and the shared observable snapshot.
//! * [`finalizer`] — silence-based utterance finalization.
//! * [`wake`] — wake-phrase detection over standby transcripts.
//! * [`sequencer`] — speech-text cleanup and chunked playback.
//! * [`greeting`] — the time-of-day boot greeting.
//! * [`arbiter`] — the state machine tying it all together.

pub mod arbiter;
pub mod events;
pub mod finalizer;
pub mod greeting;
pub mod sequencer;
pub mod state;
pub mod timer;
pub mod wake;

pub use arbiter::{VoiceArbiter, VoiceEngineHandle};
pub use events::{
    CaptureErrorKind, CaptureMode, EndReason, EngineEvent, RequestId, SequenceId, SessionId,
    TimerId,
};
pub use finalizer::{TimerCue, UtteranceFinalizer};
pub use greeting::{boot_greeting, boot_greeting_now};
pub use sequencer::{clean_for_speech, split_chunks, PlaybackSequencer, SpokenChunk};
pub use state::{new_shared_state, EngineSnapshot, Phase, SharedState};
pub use timer::{Scheduler, TimerGuard};
pub use wake::{WakeDetector, WakePhraseSet};
