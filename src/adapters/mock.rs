//! Scripted adapter doubles for engine tests.
//!
//! Each mock records the calls it receives behind a mutex and posts the
//! events a cooperative device would, so arbiter tests can drive full
//! scenarios without audio hardware.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::engine::{
    CaptureErrorKind, CaptureMode, EndReason, EngineEvent, SequenceId, SessionId, SpokenChunk,
};

use super::{CaptureAdapter, MicLevelAdapter, PlaybackAdapter, ResponseDispatcher};

// ---------------------------------------------------------------------------
// MockCapture
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CaptureInner {
    starts: Vec<(SessionId, CaptureMode)>,
    stops: usize,
    live: Option<(SessionId, mpsc::Sender<EngineEvent>)>,
    fail_next_start: Option<CaptureErrorKind>,
}

/// Capture double: confirms every start immediately and acknowledges stops
/// with a `Requested` end event, like a well-behaved device.
#[derive(Default)]
pub struct MockCapture {
    inner: Mutex<CaptureInner>,
}

impl MockCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `start` call fail synchronously.
    pub fn fail_next_start(&self, kind: CaptureErrorKind) {
        self.inner.lock().unwrap().fail_next_start = Some(kind);
    }

    pub fn starts(&self) -> Vec<(SessionId, CaptureMode)> {
        self.inner.lock().unwrap().starts.clone()
    }

    pub fn stops(&self) -> usize {
        self.inner.lock().unwrap().stops
    }

    /// Session the device currently considers live, if any.
    pub fn live_session(&self) -> Option<SessionId> {
        self.inner.lock().unwrap().live.as_ref().map(|(id, _)| *id)
    }
}

#[async_trait]
impl CaptureAdapter for MockCapture {
    async fn start(
        &self,
        session: SessionId,
        mode: CaptureMode,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<(), CaptureErrorKind> {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(kind) = inner.fail_next_start.take() {
                return Err(kind);
            }
            inner.starts.push((session, mode));
            inner.live = Some((session, events.clone()));
        }
        let _ = events.send(EngineEvent::SessionStarted(session)).await;
        Ok(())
    }

    async fn stop(&self) {
        let live = {
            let mut inner = self.inner.lock().unwrap();
            inner.stops += 1;
            inner.live.take()
        };
        if let Some((session, events)) = live {
            let _ = events
                .send(EngineEvent::SessionEnded(session, EndReason::Requested))
                .await;
        }
    }
}

// ---------------------------------------------------------------------------
// MockPlayback
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PlaybackInner {
    spoken: Vec<(SequenceId, SpokenChunk)>,
    cancels: usize,
    fail_on_index: Option<usize>,
}

/// Playback double.  In the default auto-complete mode every accepted chunk
/// ends immediately; `manual` mode swallows completions so a test can inject
/// its own `ChunkEnded`/`ChunkError` events mid-sequence.
pub struct MockPlayback {
    inner: Mutex<PlaybackInner>,
    manual: bool,
}

impl Default for MockPlayback {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlayback {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PlaybackInner::default()),
            manual: false,
        }
    }

    pub fn manual() -> Self {
        Self {
            inner: Mutex::new(PlaybackInner::default()),
            manual: true,
        }
    }

    /// Auto-complete mode only: report an error instead of an end for the
    /// chunk at `index`.
    pub fn fail_on_index(&self, index: usize) {
        self.inner.lock().unwrap().fail_on_index = Some(index);
    }

    pub fn spoken(&self) -> Vec<(SequenceId, SpokenChunk)> {
        self.inner.lock().unwrap().spoken.clone()
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .spoken
            .iter()
            .map(|(_, c)| c.text.clone())
            .collect()
    }

    pub fn cancels(&self) -> usize {
        self.inner.lock().unwrap().cancels
    }
}

#[async_trait]
impl PlaybackAdapter for MockPlayback {
    async fn speak(
        &self,
        sequence: SequenceId,
        chunk: SpokenChunk,
        events: mpsc::Sender<EngineEvent>,
    ) {
        let index = chunk.index;
        let fail = {
            let mut inner = self.inner.lock().unwrap();
            inner.spoken.push((sequence, chunk));
            inner.fail_on_index == Some(index)
        };
        if self.manual {
            return;
        }
        let event = if fail {
            EngineEvent::ChunkError(sequence, index, "synthesis failed".into())
        } else {
            EngineEvent::ChunkEnded(sequence, index)
        };
        let _ = events.send(event).await;
    }

    async fn cancel_all(&self) {
        self.inner.lock().unwrap().cancels += 1;
    }
}

// ---------------------------------------------------------------------------
// MockDispatcher
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DispatcherInner {
    utterances: Vec<String>,
    replies: VecDeque<anyhow::Result<Option<String>>>,
}

/// Dispatcher double: returns queued replies in order, `Ok(None)` once the
/// queue runs dry.  An optional delay simulates a slow backend.
#[derive(Default)]
pub struct MockDispatcher {
    inner: Mutex<DispatcherInner>,
    delay: Option<Duration>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: Mutex::new(DispatcherInner::default()),
            delay: Some(delay),
        }
    }

    pub fn push_reply(&self, reply: anyhow::Result<Option<String>>) {
        self.inner.lock().unwrap().replies.push_back(reply);
    }

    pub fn utterances(&self) -> Vec<String> {
        self.inner.lock().unwrap().utterances.clone()
    }
}

#[async_trait]
impl ResponseDispatcher for MockDispatcher {
    async fn dispatch(&self, utterance: &str) -> anyhow::Result<Option<String>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.utterances.push(utterance.to_string());
        inner.replies.pop_front().unwrap_or(Ok(None))
    }
}

// ---------------------------------------------------------------------------
// MockMicLevel
// ---------------------------------------------------------------------------

/// Level-meter double that just counts subscriptions.
#[derive(Default)]
pub struct MockMicLevel {
    subscribes: Mutex<usize>,
    unsubscribes: Mutex<usize>,
}

impl MockMicLevel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribes(&self) -> usize {
        *self.subscribes.lock().unwrap()
    }

    pub fn unsubscribes(&self) -> usize {
        *self.unsubscribes.lock().unwrap()
    }
}

#[async_trait]
impl MicLevelAdapter for MockMicLevel {
    async fn subscribe(&self, events: mpsc::Sender<EngineEvent>) -> anyhow::Result<()> {
        *self.subscribes.lock().unwrap() += 1;
        let _ = events.send(EngineEvent::MicLevel(0.0)).await;
        Ok(())
    }

    async fn unsubscribe(&self) {
        *self.unsubscribes.lock().unwrap() += 1;
    }
}
