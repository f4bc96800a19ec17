//! Voice arbiter — the top-level state machine coordinating capture and
//! playback.
//!
//! [`VoiceArbiter`] owns the [`SharedState`] and responds to [`EngineEvent`]s
//! received over a `tokio::sync::mpsc` channel.
//!
//! # Engine flow
//!
//! ```text
//! SetConversationMode(true)
//!   └─▶ stop standby capture, debounce, start CONVERSATION capture [Listening]
//!
//! PartialResult / FinalResult
//!   └─▶ finalizer buffers + (re)arms silence timer
//!         └─▶ utterance ready → stop capture [Suspended]
//!               └─▶ spawn dispatcher.dispatch(utterance)
//!                     ├─ Some(text) → clean, chunk, speak in order  [speaking]
//!                     └─ None / Err → resume capture directly
//!
//! ChunkEnded / ChunkError
//!   └─▶ next chunk, or sequence ends → resume per mode flags [Listening|Standby|Idle]
//!
//! standby transcript containing a wake phrase
//!   └─▶ stop capture, enable conversation, speak boot greeting, resume
//! ```
//!
//! Every device callback carries an identity token ([`SessionId`],
//! [`SequenceId`], [`RequestId`], [`TimerId`]); the arbiter compares it
//! against the current owner and drops stale events, so a late callback from
//! a discarded session can never drive a transition.  Capture and playback
//! are structurally mutually exclusive: the one place that starts playback
//! stops capture first, and the one place that ends a sequence is also the
//! only place capture resumes from.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;

use crate::adapters::{CaptureAdapter, MicLevelAdapter, PlaybackAdapter, ResponseDispatcher};
use crate::config::EngineConfig;
use crate::skin::VoiceSkin;

use super::events::{
    CaptureErrorKind, CaptureMode, EndReason, EngineEvent, RequestId, SequenceId, SessionId,
    TimerId,
};
use super::finalizer::{TimerCue, UtteranceFinalizer};
use super::greeting::boot_greeting_now;
use super::sequencer::PlaybackSequencer;
use super::state::{EngineSnapshot, Phase, SharedState};
use super::timer::{Scheduler, TimerGuard};
use super::wake::{WakeDetector, WakePhraseSet};

// ---------------------------------------------------------------------------
// ActiveSession
// ---------------------------------------------------------------------------

/// Per-mode transcript consumer attached to the live session.
enum SessionRole {
    Conversation(UtteranceFinalizer),
    Standby(WakeDetector),
}

/// The one live capture session, if any.
struct ActiveSession {
    id: SessionId,
    mode: CaptureMode,
    role: SessionRole,
}

/// What a transcript event asks the arbiter to do, computed while the
/// session is borrowed and acted on afterwards.
enum TranscriptOutcome {
    Nothing,
    WakeTriggered,
    Timer(TimerCue),
    Utterance(String),
}

// ---------------------------------------------------------------------------
// VoiceEngineHandle
// ---------------------------------------------------------------------------

/// Cloneable control surface for a running [`VoiceArbiter`].
///
/// All methods post onto the engine channel and return immediately; the
/// arbiter applies them in order.  Sends to a shut-down engine are silently
/// dropped.
#[derive(Clone)]
pub struct VoiceEngineHandle {
    tx: mpsc::Sender<EngineEvent>,
    state: SharedState,
}

impl VoiceEngineHandle {
    /// Enable or disable continuous conversation mode.
    pub async fn set_conversation_mode(&self, enabled: bool) {
        let _ = self.tx.send(EngineEvent::SetConversationMode(enabled)).await;
    }

    /// Enable or disable idle wake-phrase listening.
    pub async fn set_wake_word_enabled(&self, enabled: bool) {
        let _ = self.tx.send(EngineEvent::SetWakeWordEnabled(enabled)).await;
    }

    /// Switch the active voice skin.  Cancels any in-flight playback.
    pub async fn set_voice_skin(&self, skin: VoiceSkin) {
        let _ = self.tx.send(EngineEvent::SetVoiceSkin(skin)).await;
    }

    /// Speak system-initiated text, subject to the usual capture/playback
    /// mutual exclusion.
    pub async fn speak_immediate(&self, text: impl Into<String>) {
        let _ = self.tx.send(EngineEvent::SpeakImmediate(text.into())).await;
    }

    /// Count aloud from 1 to `target`, one number per chunk.
    pub async fn speak_count(&self, target: u32) {
        let text = (1..=target)
            .map(|n| format!("{n}."))
            .collect::<Vec<_>>()
            .join(" ");
        self.speak_immediate(text).await;
    }

    /// Tear the engine down: stops capture and playback, cancels timers, and
    /// ends the arbiter task.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(EngineEvent::Shutdown).await;
    }

    /// Snapshot of the observable engine state.
    pub fn snapshot(&self) -> EngineSnapshot {
        self.state.lock().unwrap().clone()
    }

    /// Shared handle to the observable state, for UIs that poll.
    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Sender for wiring additional event sources (level meters, tests) onto
    /// the engine channel.
    pub fn events(&self) -> mpsc::Sender<EngineEvent> {
        self.tx.clone()
    }
}

// ---------------------------------------------------------------------------
// VoiceArbiter
// ---------------------------------------------------------------------------

/// Drives the complete voice interaction loop.
///
/// Create with [`VoiceArbiter::new`], then call [`run`](Self::run) inside a
/// tokio task and keep the returned [`VoiceEngineHandle`].
pub struct VoiceArbiter {
    config: EngineConfig,
    state: SharedState,
    capture: Arc<dyn CaptureAdapter>,
    playback: Arc<dyn PlaybackAdapter>,
    dispatcher: Arc<dyn ResponseDispatcher>,
    mic_level: Option<Arc<dyn MicLevelAdapter>>,

    tx: mpsc::Sender<EngineEvent>,
    rx: mpsc::Receiver<EngineEvent>,
    scheduler: Scheduler,
    rng: StdRng,

    conversation_enabled: bool,
    wake_enabled: bool,
    metering: bool,

    session: Option<ActiveSession>,
    sequence: Option<PlaybackSequencer>,
    pending_request: Option<RequestId>,
    silence_timer: Option<TimerGuard>,
    pending_start: Option<(TimerGuard, CaptureMode)>,

    next_session: u64,
    next_sequence: u64,
    next_request: u64,
}

impl VoiceArbiter {
    /// Create a new arbiter and its control handle.
    ///
    /// # Arguments
    ///
    /// * `config`     — engine configuration (timers, wake phrases, voice).
    /// * `capture`    — speech-capture device adapter.
    /// * `playback`   — speech-synthesis adapter.
    /// * `dispatcher` — downstream consumer of finalized utterances.
    /// * `mic_level`  — optional amplitude meter; its absence or failure only
    ///   disables the visual meter.
    pub fn new(
        config: EngineConfig,
        capture: Arc<dyn CaptureAdapter>,
        playback: Arc<dyn PlaybackAdapter>,
        dispatcher: Arc<dyn ResponseDispatcher>,
        mic_level: Option<Arc<dyn MicLevelAdapter>>,
    ) -> (Self, VoiceEngineHandle) {
        let (tx, rx) = mpsc::channel(64);
        let state = super::state::new_shared_state();

        let handle = VoiceEngineHandle {
            tx: tx.clone(),
            state: Arc::clone(&state),
        };

        let arbiter = Self {
            config,
            state,
            capture,
            playback,
            dispatcher,
            mic_level,
            scheduler: Scheduler::new(tx.clone()),
            tx,
            rx,
            rng: StdRng::from_entropy(),
            conversation_enabled: false,
            wake_enabled: false,
            metering: false,
            session: None,
            sequence: None,
            pending_request: None,
            silence_timer: None,
            pending_start: None,
            next_session: 1,
            next_sequence: 1,
            next_request: 1,
        };

        (arbiter, handle)
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run the arbiter until [`EngineEvent::Shutdown`] arrives or every
    /// sender is dropped.  Spawn this as a tokio task.
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            match event {
                EngineEvent::SetConversationMode(on) => self.set_conversation_mode(on).await,
                EngineEvent::SetWakeWordEnabled(on) => self.set_wake_word_enabled(on).await,
                EngineEvent::SetVoiceSkin(skin) => self.set_voice_skin(skin).await,
                EngineEvent::SpeakImmediate(text) => self.speak_immediate(text).await,
                EngineEvent::Shutdown => {
                    self.teardown().await;
                    break;
                }

                EngineEvent::SessionStarted(id) => self.on_session_started(id),
                EngineEvent::PartialResult(id, text) => self.on_transcript(id, text, false).await,
                EngineEvent::FinalResult(id, text) => self.on_transcript(id, text, true).await,
                EngineEvent::SessionEnded(id, reason) => self.on_session_ended(id, reason).await,
                EngineEvent::SessionError(id, kind) => self.on_session_error(id, kind).await,

                EngineEvent::ChunkEnded(seq, index) => self.on_chunk_ended(seq, index).await,
                EngineEvent::ChunkError(seq, index, msg) => {
                    self.on_chunk_error(seq, index, msg).await
                }

                EngineEvent::MicLevel(level) => self.on_mic_level(level),
                EngineEvent::TimerFired(id) => self.on_timer_fired(id).await,
                EngineEvent::ResponseReady(req, text) => self.on_response_ready(req, text).await,
            }
        }

        log::info!("engine: arbiter shutting down");
    }

    // -----------------------------------------------------------------------
    // Control surface
    // -----------------------------------------------------------------------

    async fn set_conversation_mode(&mut self, enabled: bool) {
        if enabled == self.conversation_enabled {
            log::debug!("engine: conversation mode already {enabled}, ignoring");
            return;
        }
        log::info!("engine: conversation mode → {enabled}");
        self.conversation_enabled = enabled;
        self.pending_start = None;

        if enabled {
            self.clear_error();
            // Any standby capture gives way to a conversation session.
            self.stop_capture().await;
            if self.sequence.is_some() || self.pending_request.is_some() {
                // Capture resumes from the sequence-end / response path.
                return;
            }
            self.set_phase(Phase::Suspended);
            self.schedule_start(CaptureMode::Conversation, self.restart_debounce());
        } else {
            self.silence_timer = None;
            self.stop_capture().await;
            if self.sequence.is_some() {
                return;
            }
            if self.wake_enabled {
                self.set_phase(Phase::Suspended);
                self.schedule_start(CaptureMode::Standby, self.standby_debounce());
            } else {
                self.set_phase(Phase::Idle);
            }
        }
    }

    async fn set_wake_word_enabled(&mut self, enabled: bool) {
        if enabled == self.wake_enabled {
            log::debug!("engine: wake word already {enabled}, ignoring");
            return;
        }
        log::info!("engine: wake word → {enabled}");
        self.wake_enabled = enabled;

        if enabled {
            self.clear_error();
            let busy = self.conversation_enabled
                || self.session.is_some()
                || self.sequence.is_some()
                || self.pending_request.is_some()
                || self.pending_start.is_some();
            if !busy {
                self.schedule_start(CaptureMode::Standby, self.standby_debounce());
            }
        } else {
            if matches!(&self.pending_start, Some((_, CaptureMode::Standby))) {
                self.pending_start = None;
            }
            if self
                .session
                .as_ref()
                .is_some_and(|s| s.mode == CaptureMode::Standby)
            {
                self.stop_capture().await;
            }
            if !self.conversation_enabled && self.session.is_none() && self.sequence.is_none() {
                self.set_phase(Phase::Idle);
            }
        }
    }

    async fn set_voice_skin(&mut self, skin: VoiceSkin) {
        log::info!("engine: voice skin → {skin:?}");
        self.config.voice.skin = skin;

        // A sequence in the old voice is cancelled, not resumed.
        if self.sequence.is_some() {
            self.playback.cancel_all().await;
            self.finish_sequence().await;
        }
    }

    async fn speak_immediate(&mut self, text: String) {
        log::debug!("engine: speak_immediate {text:?}");
        self.begin_playback(&text).await;
    }

    async fn teardown(&mut self) {
        self.pending_start = None;
        self.silence_timer = None;
        self.pending_request = None;
        self.stop_capture().await;
        if self.sequence.take().is_some() {
            self.playback.cancel_all().await;
        }

        let mut st = self.state.lock().unwrap();
        st.phase = Phase::Idle;
        st.is_listening = false;
        st.is_speaking = false;
        st.interim_text.clear();
        st.mic_volume = 0.0;
    }

    // -----------------------------------------------------------------------
    // Capture lifecycle
    // -----------------------------------------------------------------------

    /// Start a capture session in `mode`.  The caller guarantees no session
    /// is live; a start that races one is dropped.
    async fn start_capture(&mut self, mode: CaptureMode) {
        if self.session.is_some() {
            log::debug!("engine: start_capture while a session is live, ignoring");
            return;
        }

        let id = SessionId(self.next_session);
        self.next_session += 1;

        let role = match mode {
            CaptureMode::Conversation => SessionRole::Conversation(UtteranceFinalizer::new()),
            CaptureMode::Standby => SessionRole::Standby(WakeDetector::new(WakePhraseSet::new(
                &self.config.wake.phrases,
            ))),
        };

        log::debug!("engine: starting capture {id:?} ({mode:?})");
        match self.capture.start(id, mode, self.tx.clone()).await {
            Ok(()) => {
                self.session = Some(ActiveSession { id, mode, role });
                self.set_phase(match mode {
                    CaptureMode::Conversation => Phase::Listening,
                    CaptureMode::Standby => Phase::Standby,
                });
                self.set_listening(mode == CaptureMode::Conversation);
                self.set_interim("");
                self.subscribe_meter().await;
            }
            Err(kind) if kind.is_ignorable() => {
                log::warn!("engine: capture start failed ({kind}), retrying after backoff");
                self.set_phase(Phase::ErrorBackoff);
                self.schedule_start(mode, self.error_backoff());
            }
            Err(kind) => self.fatal_stop(kind).await,
        }
    }

    /// Stop the live session, if any, and clear its observable traces.  The
    /// session is discarded before the adapter is told to stop, so the
    /// resulting `SessionEnded` arrives stale and is ignored.
    async fn stop_capture(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        log::debug!("engine: stopping capture {:?}", session.id);

        self.silence_timer = None;
        self.capture.stop().await;
        self.unsubscribe_meter().await;

        let mut st = self.state.lock().unwrap();
        st.is_listening = false;
        st.interim_text.clear();
        st.mic_volume = 0.0;
    }

    fn on_session_started(&mut self, id: SessionId) {
        if self.session.as_ref().map(|s| s.id) != Some(id) {
            log::debug!("engine: stale SessionStarted {id:?} ignored");
            return;
        }
        log::debug!("engine: capture {id:?} confirmed live");
    }

    async fn on_transcript(&mut self, id: SessionId, text: String, is_final: bool) {
        let outcome = {
            let Some(session) = self.session.as_mut() else {
                log::debug!("engine: transcript for dead session {id:?} ignored");
                return;
            };
            if session.id != id {
                log::debug!("engine: stale transcript from {id:?} ignored");
                return;
            }

            match &mut session.role {
                SessionRole::Standby(wake) => {
                    if wake.observe(&text) {
                        TranscriptOutcome::WakeTriggered
                    } else {
                        TranscriptOutcome::Nothing
                    }
                }
                SessionRole::Conversation(finalizer) => {
                    if is_final {
                        match finalizer.on_final(&text) {
                            Some(utterance) => TranscriptOutcome::Utterance(utterance),
                            None => TranscriptOutcome::Nothing,
                        }
                    } else {
                        TranscriptOutcome::Timer(finalizer.on_partial(&text))
                    }
                }
            }
        };

        match outcome {
            TranscriptOutcome::Nothing => {}
            TranscriptOutcome::WakeTriggered => self.wake_triggered().await,
            TranscriptOutcome::Timer(TimerCue::Rearm) => {
                self.set_interim(&text);
                self.silence_timer = Some(self.scheduler.schedule(self.silence_timeout()));
            }
            TranscriptOutcome::Timer(TimerCue::Cancel) => {
                self.set_interim("");
                self.silence_timer = None;
            }
            TranscriptOutcome::Utterance(utterance) => self.finalize_utterance(utterance).await,
        }
    }

    async fn on_session_ended(&mut self, id: SessionId, reason: EndReason) {
        if self.session.as_ref().map(|s| s.id) != Some(id) {
            log::debug!("engine: stale SessionEnded {id:?} ignored");
            return;
        }

        // Requested stops clear the session before calling the adapter, so
        // any end event for the current session is device-driven.
        let Some(session) = self.session.take() else {
            return;
        };
        log::warn!(
            "engine: capture {id:?} ended unexpectedly ({reason:?}), restarting after backoff"
        );
        self.silence_timer = None;
        self.unsubscribe_meter().await;
        self.set_listening(false);
        self.set_interim("");
        self.set_phase(Phase::ErrorBackoff);
        self.schedule_start(session.mode, self.error_backoff());
    }

    async fn on_session_error(&mut self, id: SessionId, kind: CaptureErrorKind) {
        if self.session.as_ref().map(|s| s.id) != Some(id) {
            log::debug!("engine: stale SessionError {id:?} ignored");
            return;
        }
        if kind.is_ignorable() {
            // Recovery rides on the session's own end event.
            log::debug!("engine: ignorable capture error ({kind})");
            return;
        }
        self.fatal_stop(kind).await;
    }

    /// Fatal capture error: stop everything and require explicit re-enabling.
    async fn fatal_stop(&mut self, kind: CaptureErrorKind) {
        log::error!("engine: fatal capture error: {kind}");
        self.conversation_enabled = false;
        self.wake_enabled = false;
        self.pending_start = None;
        self.pending_request = None;
        self.stop_capture().await;
        if self.sequence.take().is_some() {
            self.playback.cancel_all().await;
        }

        let mut st = self.state.lock().unwrap();
        st.phase = Phase::Idle;
        st.is_speaking = false;
        st.last_error = Some(kind.to_string());
    }

    // -----------------------------------------------------------------------
    // Utterance → response → playback
    // -----------------------------------------------------------------------

    async fn finalize_utterance(&mut self, utterance: String) {
        log::info!("engine: utterance finalized: {utterance:?}");
        self.silence_timer = None;
        self.stop_capture().await;
        self.set_phase(Phase::Suspended);

        let req = RequestId(self.next_request);
        self.next_request += 1;
        self.pending_request = Some(req);

        let dispatcher = Arc::clone(&self.dispatcher);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let reply = match dispatcher.dispatch(&utterance).await {
                Ok(reply) => reply,
                Err(e) => {
                    // A dispatcher failure means "no response text"; capture
                    // must still resume.
                    log::warn!("engine: dispatcher failed ({e})");
                    None
                }
            };
            let _ = tx.send(EngineEvent::ResponseReady(req, reply)).await;
        });
    }

    async fn on_response_ready(&mut self, req: RequestId, text: Option<String>) {
        if self.pending_request != Some(req) {
            log::debug!("engine: stale ResponseReady {req:?} ignored");
            return;
        }
        self.pending_request = None;

        match text {
            Some(text) => self.begin_playback(&text).await,
            None => {
                log::debug!("engine: no response text, resuming capture");
                self.resume_capture().await;
            }
        }
    }

    /// Start speaking `text`.  Stops capture first — this is the single point
    /// where playback begins, which is what makes capture/playback mutual
    /// exclusion structural rather than checked.  A sequence already in
    /// flight is cancelled, and any outstanding dispatcher request is
    /// dropped so its late response cannot queue a second sequence.
    async fn begin_playback(&mut self, text: &str) {
        self.pending_start = None;
        self.pending_request = None;
        if self.sequence.take().is_some() {
            self.playback.cancel_all().await;
            self.set_speaking(false);
        }
        self.stop_capture().await;

        let id = SequenceId(self.next_sequence);
        self.next_sequence += 1;

        let profile = self.config.voice.skin.profile();
        match PlaybackSequencer::new(id, text, profile, self.config.voice.calibration) {
            Some(sequencer) => {
                log::debug!("engine: speaking {} chunk(s) as {id:?}", sequencer.len());
                self.sequence = Some(sequencer);
                self.set_phase(Phase::Suspended);
                self.set_speaking(true);
                self.pump_chunk().await;
            }
            None => {
                log::debug!("engine: nothing speakable, resuming capture");
                self.resume_capture().await;
            }
        }
    }

    /// Submit the next chunk, or end the sequence when the queue is done.
    async fn pump_chunk(&mut self) {
        let (id, chunk) = match self.sequence.as_mut() {
            Some(seq) => (seq.id(), seq.next_chunk(&mut self.rng)),
            None => return,
        };
        match chunk {
            Some(chunk) => self.playback.speak(id, chunk, self.tx.clone()).await,
            None => self.finish_sequence().await,
        }
    }

    /// Returns `true` when an end/error event names both the live sequence
    /// and the chunk actually in flight; duplicated or late completions fail
    /// the index check and are dropped like any other stale event.
    fn chunk_event_is_current(&self, seq: SequenceId, index: usize) -> bool {
        self.sequence
            .as_ref()
            .is_some_and(|s| s.id() == seq && s.in_flight() == Some(index))
    }

    async fn on_chunk_ended(&mut self, seq: SequenceId, index: usize) {
        if !self.chunk_event_is_current(seq, index) {
            log::debug!("engine: stale ChunkEnded {seq:?}/{index} ignored");
            return;
        }
        self.pump_chunk().await;
    }

    async fn on_chunk_error(&mut self, seq: SequenceId, index: usize, message: String) {
        if !self.chunk_event_is_current(seq, index) {
            log::debug!("engine: stale ChunkError {seq:?}/{index} ignored");
            return;
        }
        // Abandon the rest of the queue; the sequence still ends normally so
        // capture always resumes.
        log::warn!("engine: chunk {index} of {seq:?} failed ({message}), abandoning sequence");
        self.finish_sequence().await;
    }

    /// The single exit point of a playback sequence, reached on completion,
    /// chunk error, skin change, or cancellation.
    async fn finish_sequence(&mut self) {
        self.sequence = None;
        self.set_speaking(false);
        self.resume_capture().await;
    }

    /// Restart capture according to the current mode flags.
    async fn resume_capture(&mut self) {
        if self.conversation_enabled {
            self.set_phase(Phase::Suspended);
            self.schedule_start(CaptureMode::Conversation, self.restart_debounce());
        } else if self.wake_enabled {
            self.set_phase(Phase::Suspended);
            self.schedule_start(CaptureMode::Standby, self.standby_debounce());
        } else {
            self.set_phase(Phase::Idle);
        }
    }

    // -----------------------------------------------------------------------
    // Wake / boot sequence
    // -----------------------------------------------------------------------

    async fn wake_triggered(&mut self) {
        log::info!("engine: wake phrase matched, running boot sequence");
        self.stop_capture().await;
        self.conversation_enabled = true;
        self.clear_error();

        let greeting = boot_greeting_now(&self.config.master_name, &mut self.rng);
        self.begin_playback(&greeting).await;
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    async fn on_timer_fired(&mut self, id: TimerId) {
        if self.silence_timer.as_ref().is_some_and(|g| g.matches(id)) {
            self.silence_timer = None;
            let utterance = match self.session.as_mut() {
                Some(ActiveSession {
                    role: SessionRole::Conversation(finalizer),
                    ..
                }) => finalizer.on_silence_timeout(),
                _ => None,
            };
            if let Some(utterance) = utterance {
                self.finalize_utterance(utterance).await;
            }
        } else if let Some((guard, mode)) = self.pending_start.take() {
            if guard.matches(id) {
                drop(guard);
                self.start_capture(mode).await;
            } else {
                self.pending_start = Some((guard, mode));
                log::debug!("engine: stale timer {id:?} ignored");
            }
        } else {
            log::debug!("engine: stale timer {id:?} ignored");
        }
    }

    fn schedule_start(&mut self, mode: CaptureMode, delay: Duration) {
        // Replacing the option drops (and thus cancels) any previous timer,
        // so at most one pending start exists.
        let guard = self.scheduler.schedule(delay);
        self.pending_start = Some((guard, mode));
    }

    fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.config.timing.silence_timeout_ms)
    }

    fn restart_debounce(&self) -> Duration {
        Duration::from_millis(self.config.timing.restart_debounce_ms)
    }

    fn standby_debounce(&self) -> Duration {
        Duration::from_millis(self.config.timing.standby_debounce_ms)
    }

    fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.config.timing.error_backoff_ms)
    }

    // -----------------------------------------------------------------------
    // Microphone level meter
    // -----------------------------------------------------------------------

    async fn subscribe_meter(&mut self) {
        let Some(meter) = &self.mic_level else {
            return;
        };
        if self.metering {
            return;
        }
        match meter.subscribe(self.tx.clone()).await {
            Ok(()) => self.metering = true,
            // Metering failure only disables the visual meter.
            Err(e) => log::warn!("engine: mic level meter unavailable: {e}"),
        }
    }

    async fn unsubscribe_meter(&mut self) {
        if !self.metering {
            return;
        }
        if let Some(meter) = &self.mic_level {
            meter.unsubscribe().await;
        }
        self.metering = false;
    }

    fn on_mic_level(&mut self, level: f32) {
        let mut st = self.state.lock().unwrap();
        st.mic_volume = level.clamp(0.0, 1.0);
    }

    // -----------------------------------------------------------------------
    // Snapshot helpers
    // -----------------------------------------------------------------------

    fn set_phase(&self, phase: Phase) {
        let mut st = self.state.lock().unwrap();
        st.phase = phase;
    }

    fn set_listening(&self, on: bool) {
        let mut st = self.state.lock().unwrap();
        st.is_listening = on;
    }

    fn set_speaking(&self, on: bool) {
        let mut st = self.state.lock().unwrap();
        st.is_speaking = on;
    }

    fn set_interim(&self, text: &str) {
        let mut st = self.state.lock().unwrap();
        st.interim_text.clear();
        st.interim_text.push_str(text);
    }

    fn clear_error(&self) {
        let mut st = self.state.lock().unwrap();
        st.last_error = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockCapture, MockDispatcher, MockMicLevel, MockPlayback};

    // -----------------------------------------------------------------------
    // Harness
    // -----------------------------------------------------------------------

    struct Harness {
        handle: VoiceEngineHandle,
        capture: Arc<MockCapture>,
        playback: Arc<MockPlayback>,
        dispatcher: Arc<MockDispatcher>,
        task: tokio::task::JoinHandle<()>,
    }

    impl Harness {
        fn spawn() -> Self {
            Self::spawn_with(EngineConfig::default(), MockPlayback::new(), None)
        }

        fn spawn_with(
            config: EngineConfig,
            playback: MockPlayback,
            mic_level: Option<Arc<MockMicLevel>>,
        ) -> Self {
            Self::spawn_parts(config, playback, mic_level, MockDispatcher::new())
        }

        fn spawn_parts(
            config: EngineConfig,
            playback: MockPlayback,
            mic_level: Option<Arc<MockMicLevel>>,
            dispatcher: MockDispatcher,
        ) -> Self {
            let capture = Arc::new(MockCapture::new());
            let playback = Arc::new(playback);
            let dispatcher = Arc::new(dispatcher);

            let (arbiter, handle) = VoiceArbiter::new(
                config,
                Arc::clone(&capture) as Arc<dyn CaptureAdapter>,
                Arc::clone(&playback) as Arc<dyn PlaybackAdapter>,
                Arc::clone(&dispatcher) as Arc<dyn ResponseDispatcher>,
                mic_level.map(|m| m as Arc<dyn MicLevelAdapter>),
            );
            let task = tokio::spawn(arbiter.run());

            Self {
                handle,
                capture,
                playback,
                dispatcher,
                task,
            }
        }

        /// Let the paused clock advance `ms` and the arbiter drain its queue.
        async fn tick(&self, ms: u64) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        /// Id of the most recently started capture session.
        fn last_session(&self) -> SessionId {
            self.capture.starts().last().expect("no capture started").0
        }

        async fn send(&self, event: EngineEvent) {
            self.handle.events().send(event).await.unwrap();
        }

        async fn finish(self) {
            self.handle.shutdown().await;
            self.task.await.unwrap();
        }
    }

    /// Drive the engine into Listening with one conversation session live.
    async fn listening_harness() -> Harness {
        let h = Harness::spawn();
        h.handle.set_conversation_mode(true).await;
        h.tick(400).await;
        assert_eq!(h.capture.starts().len(), 1);
        h
    }

    // -----------------------------------------------------------------------
    // Mode toggles
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn conversation_on_starts_capture_after_debounce() {
        let h = Harness::spawn();
        h.handle.set_conversation_mode(true).await;

        h.tick(100).await;
        assert!(h.capture.starts().is_empty(), "debounce not elapsed yet");

        h.tick(300).await;
        assert_eq!(h.capture.starts(), vec![(SessionId(1), CaptureMode::Conversation)]);

        let snap = h.handle.snapshot();
        assert_eq!(snap.phase, Phase::Listening);
        assert!(snap.is_listening);
        assert!(!snap.is_speaking);

        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn mode_toggles_are_idempotent() {
        let h = Harness::spawn();
        h.handle.set_conversation_mode(true).await;
        h.handle.set_conversation_mode(true).await;
        h.tick(400).await;
        h.handle.set_conversation_mode(true).await;
        h.tick(400).await;

        assert_eq!(h.capture.starts().len(), 1);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_toggling_never_overlaps_sessions() {
        let h = Harness::spawn();
        // On/off/on inside the debounce window.
        h.handle.set_conversation_mode(true).await;
        h.tick(100).await;
        h.handle.set_conversation_mode(false).await;
        h.tick(50).await;
        h.handle.set_conversation_mode(true).await;
        h.tick(400).await;

        assert_eq!(h.capture.starts().len(), 1);
        assert!(h.capture.live_session().is_some());
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn conversation_off_stops_capture_and_schedules_nothing() {
        let h = listening_harness().await;

        h.handle.set_conversation_mode(false).await;
        h.tick(1).await;
        assert!(h.capture.live_session().is_none());
        assert_eq!(h.handle.snapshot().phase, Phase::Idle);

        // No auto-restart, no matter how long we wait.
        h.tick(10_000).await;
        assert_eq!(h.capture.starts().len(), 1);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn conversation_off_with_wake_enabled_falls_back_to_standby() {
        let h = Harness::spawn();
        h.handle.set_wake_word_enabled(true).await;
        h.handle.set_conversation_mode(true).await;
        h.tick(400).await;
        assert_eq!(h.capture.starts().len(), 1);

        h.handle.set_conversation_mode(false).await;
        h.tick(600).await;

        let starts = h.capture.starts();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[1].1, CaptureMode::Standby);
        assert_eq!(h.handle.snapshot().phase, Phase::Standby);
        assert!(!h.handle.snapshot().is_listening);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn wake_toggle_starts_and_stops_standby() {
        let h = Harness::spawn();
        h.handle.set_wake_word_enabled(true).await;
        h.tick(600).await;
        assert_eq!(h.capture.starts(), vec![(SessionId(1), CaptureMode::Standby)]);
        assert_eq!(h.handle.snapshot().phase, Phase::Standby);

        h.handle.set_wake_word_enabled(false).await;
        h.tick(1).await;
        assert!(h.capture.live_session().is_none());
        assert_eq!(h.handle.snapshot().phase, Phase::Idle);

        h.tick(10_000).await;
        assert_eq!(h.capture.starts().len(), 1);
        h.finish().await;
    }

    // -----------------------------------------------------------------------
    // Finalization → dispatch → playback
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn silence_finalizes_last_partial() {
        let h = listening_harness().await;
        let sid = h.last_session();

        h.send(EngineEvent::PartialResult(sid, "hel".into())).await;
        h.send(EngineEvent::PartialResult(sid, "hello".into())).await;
        h.tick(1).await;
        assert_eq!(h.handle.snapshot().interim_text, "hello");

        h.tick(2_100).await;
        assert_eq!(h.dispatcher.utterances(), vec!["hello"]);

        // Default reply is None: capture resumes directly, no playback.
        h.tick(400).await;
        assert!(h.playback.spoken().is_empty());
        assert_eq!(h.capture.starts().len(), 2);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn final_result_finalizes_immediately_without_double_fire() {
        let h = listening_harness().await;
        let sid = h.last_session();

        h.send(EngineEvent::PartialResult(sid, "turn on the ligh".into())).await;
        h.send(EngineEvent::FinalResult(sid, "turn on the lights".into())).await;
        h.tick(1).await;
        assert_eq!(h.dispatcher.utterances(), vec!["turn on the lights"]);

        // The armed silence timer must not produce a second utterance.
        h.tick(3_000).await;
        assert_eq!(h.dispatcher.utterances().len(), 1);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn response_is_spoken_then_capture_resumes() {
        let h = listening_harness().await;
        let sid = h.last_session();
        h.dispatcher.push_reply(Ok(Some("One. Two.".into())));

        h.send(EngineEvent::FinalResult(sid, "count to two".into())).await;
        h.tick(10).await;

        assert_eq!(h.playback.spoken_texts(), vec!["One.", "Two."]);
        let snap = h.handle.snapshot();
        assert!(!snap.is_speaking);

        h.tick(400).await;
        assert_eq!(h.capture.starts().len(), 2);
        assert_eq!(h.handle.snapshot().phase, Phase::Listening);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn capture_and_playback_never_overlap() {
        let h = Harness::spawn_with(EngineConfig::default(), MockPlayback::manual(), None);
        h.handle.set_conversation_mode(true).await;
        h.tick(400).await;
        let sid = h.last_session();
        h.dispatcher.push_reply(Ok(Some("Speaking now.".into())));

        h.send(EngineEvent::FinalResult(sid, "say something".into())).await;
        h.tick(10).await;

        // Manual playback holds the chunk in flight: engine is speaking.
        let snap = h.handle.snapshot();
        assert!(snap.is_speaking);
        assert!(!snap.is_listening);
        assert!(h.capture.live_session().is_none());

        // Complete the chunk; mutual exclusion flips the other way.
        let (seq, chunk) = h.playback.spoken().pop().unwrap();
        h.send(EngineEvent::ChunkEnded(seq, chunk.index)).await;
        h.tick(400).await;

        let snap = h.handle.snapshot();
        assert!(!snap.is_speaking);
        assert!(snap.is_listening);
        assert!(h.capture.live_session().is_some());
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_error_abandons_rest_and_still_resumes() {
        let h = listening_harness().await;
        let sid = h.last_session();
        h.playback.fail_on_index(1);
        h.dispatcher.push_reply(Ok(Some("A. B. C.".into())));

        h.send(EngineEvent::FinalResult(sid, "speak".into())).await;
        h.tick(10).await;

        // Chunk 1 errored: chunk 2 is never submitted.
        assert_eq!(h.playback.spoken_texts(), vec!["A.", "B."]);
        assert!(!h.handle.snapshot().is_speaking);

        h.tick(400).await;
        assert_eq!(h.capture.starts().len(), 2);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dispatcher_error_is_treated_as_no_response() {
        let h = listening_harness().await;
        let sid = h.last_session();
        h.dispatcher.push_reply(Err(anyhow::anyhow!("backend offline")));

        h.send(EngineEvent::FinalResult(sid, "hello".into())).await;
        h.tick(400).await;

        assert!(h.playback.spoken().is_empty());
        assert_eq!(h.capture.starts().len(), 2, "capture must resume");
        h.finish().await;
    }

    // -----------------------------------------------------------------------
    // Wake phrase / boot sequence
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn wake_phrase_boots_into_conversation_exactly_once() {
        let h = Harness::spawn();
        h.handle.set_wake_word_enabled(true).await;
        h.tick(600).await;
        let sid = h.last_session();

        // Phrase appears twice in one transcript, then again in a late event.
        h.send(EngineEvent::PartialResult(sid, "hey marco hey marco".into())).await;
        h.send(EngineEvent::PartialResult(sid, "hey marco again".into())).await;
        h.tick(10).await;

        let spoken = h.playback.spoken_texts();
        assert!(!spoken.is_empty(), "boot greeting was spoken");
        assert!(spoken[0].starts_with("Good "), "greeting opens the sequence: {spoken:?}");
        assert!(spoken.concat().contains("Systems Online."));

        // Boot sequence enables conversation mode.
        h.tick(400).await;
        let starts = h.capture.starts();
        assert_eq!(starts.len(), 2, "exactly one boot sequence ran");
        assert_eq!(starts[1].1, CaptureMode::Conversation);
        assert_eq!(h.handle.snapshot().phase, Phase::Listening);
        h.finish().await;
    }

    // -----------------------------------------------------------------------
    // Error handling
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn ignorable_error_leaves_state_untouched_until_session_ends() {
        let h = Harness::spawn();
        h.handle.set_wake_word_enabled(true).await;
        h.tick(600).await;
        let sid = h.last_session();

        h.send(EngineEvent::SessionError(sid, CaptureErrorKind::NoSpeech)).await;
        h.tick(10).await;
        assert_eq!(h.handle.snapshot().phase, Phase::Standby);
        assert_eq!(h.capture.starts().len(), 1);

        // The device then ends the session on its own: backoff + restart in
        // the same mode.
        h.send(EngineEvent::SessionEnded(sid, EndReason::Device)).await;
        h.tick(10).await;
        assert_eq!(h.handle.snapshot().phase, Phase::ErrorBackoff);

        h.tick(1_100).await;
        let starts = h.capture.starts();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[1].1, CaptureMode::Standby);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_stops_everything_without_retry() {
        let h = listening_harness().await;
        let sid = h.last_session();

        h.send(EngineEvent::SessionError(sid, CaptureErrorKind::PermissionDenied)).await;
        h.tick(10).await;

        let snap = h.handle.snapshot();
        assert_eq!(snap.phase, Phase::Idle);
        assert!(snap.last_error.is_some());
        assert!(h.capture.live_session().is_none());

        // No auto-retry.
        h.tick(10_000).await;
        assert_eq!(h.capture.starts().len(), 1);

        // Explicit re-enable works and clears the notification.
        h.handle.set_conversation_mode(true).await;
        h.tick(400).await;
        assert_eq!(h.capture.starts().len(), 2);
        assert!(h.handle.snapshot().last_error.is_none());
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_end_restarts_in_same_mode_after_backoff() {
        let h = listening_harness().await;
        let sid = h.last_session();

        h.send(EngineEvent::SessionEnded(sid, EndReason::Device)).await;
        h.tick(10).await;
        assert_eq!(h.handle.snapshot().phase, Phase::ErrorBackoff);
        assert_eq!(h.capture.starts().len(), 1);

        h.tick(1_100).await;
        let starts = h.capture.starts();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[1].1, CaptureMode::Conversation);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_session_events_are_ignored() {
        let h = listening_harness().await;
        let old = h.last_session();

        h.handle.set_conversation_mode(false).await;
        h.tick(1).await;

        // Late events from the stopped session must not restart anything.
        h.send(EngineEvent::PartialResult(old, "hello".into())).await;
        h.send(EngineEvent::SessionEnded(old, EndReason::Device)).await;
        h.send(EngineEvent::SessionError(old, CaptureErrorKind::Device("gone".into()))).await;
        h.tick(5_000).await;

        assert_eq!(h.capture.starts().len(), 1);
        assert!(h.dispatcher.utterances().is_empty());
        assert_eq!(h.handle.snapshot().phase, Phase::Idle);
        assert!(h.handle.snapshot().last_error.is_none());
        h.finish().await;
    }

    // -----------------------------------------------------------------------
    // Skin change / speak_immediate
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn skin_change_mid_playback_cancels_and_resumes() {
        let h = Harness::spawn_with(EngineConfig::default(), MockPlayback::manual(), None);
        h.handle.set_conversation_mode(true).await;
        h.tick(400).await;
        let sid = h.last_session();
        h.dispatcher.push_reply(Ok(Some("Long monologue.".into())));
        h.send(EngineEvent::FinalResult(sid, "talk".into())).await;
        h.tick(10).await;
        assert!(h.handle.snapshot().is_speaking);
        let (seq, chunk) = h.playback.spoken().pop().unwrap();

        h.handle.set_voice_skin(VoiceSkin::CyberHacker).await;
        h.tick(10).await;
        assert_eq!(h.playback.cancels(), 1);
        assert!(!h.handle.snapshot().is_speaking);

        // The old sequence does not resume, and its late end event is stale.
        h.send(EngineEvent::ChunkEnded(seq, chunk.index)).await;
        h.tick(400).await;
        assert_eq!(h.playback.spoken().len(), 1);
        assert_eq!(h.capture.starts().len(), 2, "capture resumed exactly once");
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn speak_immediate_suspends_capture_and_resumes_after() {
        let h = listening_harness().await;

        h.handle.speak_immediate("Stand by.").await;
        h.tick(10).await;
        assert_eq!(h.playback.spoken_texts(), vec!["Stand by."]);
        assert_eq!(h.capture.stops(), 1);

        h.tick(400).await;
        assert_eq!(h.capture.starts().len(), 2);
        assert_eq!(h.handle.snapshot().phase, Phase::Listening);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn slow_response_is_dropped_when_immediate_speech_supersedes_it() {
        let h = Harness::spawn_parts(
            EngineConfig::default(),
            MockPlayback::manual(),
            None,
            MockDispatcher::with_delay(Duration::from_millis(500)),
        );
        h.handle.set_conversation_mode(true).await;
        h.tick(400).await;
        let sid = h.last_session();
        h.dispatcher.push_reply(Ok(Some("Here it is.".into())));

        h.send(EngineEvent::FinalResult(sid, "fetch it".into())).await;
        h.tick(10).await;
        assert!(h.playback.spoken().is_empty(), "reply still in flight");

        // System speech arrives while the backend is still thinking.
        h.handle.speak_immediate("Priority alert.").await;
        h.tick(10).await;
        assert_eq!(h.playback.spoken_texts(), vec!["Priority alert."]);

        // The reply lands mid-playback; it was superseded and must not start
        // a second sequence.
        h.tick(600).await;
        assert_eq!(h.dispatcher.utterances(), vec!["fetch it"]);
        assert_eq!(h.playback.spoken_texts(), vec!["Priority alert."]);
        assert!(h.handle.snapshot().is_speaking);

        let (seq, chunk) = h.playback.spoken().pop().unwrap();
        h.send(EngineEvent::ChunkEnded(seq, chunk.index)).await;
        h.tick(400).await;
        assert!(!h.handle.snapshot().is_speaking);
        assert_eq!(h.capture.starts().len(), 2, "capture resumed exactly once");
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_speech_cancels_a_reply_already_playing() {
        let h = Harness::spawn_with(EngineConfig::default(), MockPlayback::manual(), None);
        h.handle.set_conversation_mode(true).await;
        h.tick(400).await;
        let sid = h.last_session();
        h.dispatcher.push_reply(Ok(Some("Long answer.".into())));
        h.send(EngineEvent::FinalResult(sid, "talk".into())).await;
        h.tick(10).await;
        let (old_seq, old_chunk) = h.playback.spoken().pop().unwrap();

        h.handle.speak_immediate("Priority alert.").await;
        h.tick(10).await;
        assert_eq!(h.playback.cancels(), 1);
        assert_eq!(h.playback.spoken_texts(), vec!["Long answer.", "Priority alert."]);

        // The cancelled sequence's late completion is stale and must not end
        // the replacement sequence.
        h.send(EngineEvent::ChunkEnded(old_seq, old_chunk.index)).await;
        h.tick(10).await;
        assert!(h.handle.snapshot().is_speaking);

        let (seq, chunk) = h.playback.spoken().pop().unwrap();
        h.send(EngineEvent::ChunkEnded(seq, chunk.index)).await;
        h.tick(400).await;
        assert!(!h.handle.snapshot().is_speaking);
        assert_eq!(h.capture.starts().len(), 2);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_chunk_end_does_not_skip_ahead_or_end_early() {
        let h = Harness::spawn_with(EngineConfig::default(), MockPlayback::manual(), None);
        h.handle.set_conversation_mode(true).await;
        h.tick(400).await;
        let sid = h.last_session();
        h.dispatcher.push_reply(Ok(Some("First. Second.".into())));
        h.send(EngineEvent::FinalResult(sid, "speak".into())).await;
        h.tick(10).await;
        let (seq, first) = h.playback.spoken().pop().unwrap();
        assert_eq!(first.index, 0);

        // A glitchy device reports the same completion twice.
        h.send(EngineEvent::ChunkEnded(seq, 0)).await;
        h.send(EngineEvent::ChunkEnded(seq, 0)).await;
        h.tick(10).await;

        // Chunk 1 went out once; the duplicate must not end the sequence
        // while it is still in flight.
        assert_eq!(h.playback.spoken_texts(), vec!["First.", "Second."]);
        assert!(h.handle.snapshot().is_speaking);
        assert_eq!(h.capture.starts().len(), 1);

        h.send(EngineEvent::ChunkEnded(seq, 1)).await;
        h.tick(400).await;
        assert!(!h.handle.snapshot().is_speaking);
        assert_eq!(h.capture.starts().len(), 2);
        h.finish().await;
    }

    #[tokio::test(start_paused = true)]
    async fn speak_count_counts_upward_in_chunks() {
        let h = Harness::spawn();
        h.handle.speak_count(3).await;
        h.tick(10).await;

        assert_eq!(h.playback.spoken_texts(), vec!["1.", "2.", "3."]);
        assert_eq!(h.handle.snapshot().phase, Phase::Idle);
        h.finish().await;
    }

    // -----------------------------------------------------------------------
    // Microphone level meter
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn meter_follows_session_lifetime_and_updates_volume() {
        let meter = Arc::new(MockMicLevel::new());
        let h = Harness::spawn_with(
            EngineConfig::default(),
            MockPlayback::new(),
            Some(Arc::clone(&meter)),
        );

        h.handle.set_conversation_mode(true).await;
        h.tick(400).await;
        assert_eq!(meter.subscribes(), 1);

        h.send(EngineEvent::MicLevel(0.4)).await;
        h.tick(1).await;
        assert_eq!(h.handle.snapshot().mic_volume, 0.4);

        h.handle.set_conversation_mode(false).await;
        h.tick(1).await;
        assert_eq!(meter.unsubscribes(), 1);
        assert_eq!(h.handle.snapshot().mic_volume, 0.0);
        h.finish().await;
    }
}
