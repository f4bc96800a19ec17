//! marco-voice — the voice interaction engine of a personal assistant client.
//!
//! Turns a continuously-listening speech-capture device and a turn-based
//! speech-playback device into a single-active-speaker conversational loop:
//! wake-phrase standby, silence-based utterance finalization, automatic
//! recovery from transient capture failures, and strict mutual exclusion
//! between listening and speaking.
//!
//! # Architecture
//!
//! ```text
//! UI toggles ──▶ VoiceEngineHandle ─┐
//! capture device callbacks ─────────┼─▶ EngineEvent channel ─▶ VoiceArbiter
//! playback callbacks / timers ──────┘                            │
//!                                                                ▼
//!                          CaptureAdapter / PlaybackAdapter / dispatcher
//! ```
//!
//! Everything the engine reacts to arrives on one channel and is handled in
//! order by one task; asynchronous callbacks carry identity tokens so stale
//! events from superseded sessions are dropped, never acted on.
//!
//! # Modules
//!
//! * [`config`] — settings structs and TOML persistence.
//! * [`skin`] — voice skins and per-chunk playback parameters.
//! * [`adapters`] — trait seams for the platform collaborators.
//! * [`engine`] — the arbiter, finalizer, wake detector, sequencer, timers.

pub mod adapters;
pub mod config;
pub mod engine;
pub mod skin;
