//! Utterance finalization: deciding when the user has finished speaking.
//!
//! [`UtteranceFinalizer`] buffers the latest interim transcript and tells the
//! arbiter when to arm or cancel the silence timer.  It emits at most one
//! utterance per capture session:
//!
//! * a device-final transcript finalizes immediately (its text wins over any
//!   buffered interim), and
//! * silence-timer expiry finalizes whatever interim text is buffered.
//!
//! The finalizer never stops sessions or owns timers itself — the arbiter
//! holds the actual [`TimerGuard`](super::timer::TimerGuard) and calls
//! [`on_silence_timeout`](UtteranceFinalizer::on_silence_timeout) when it
//! fires.

// ---------------------------------------------------------------------------
// TimerCue
// ---------------------------------------------------------------------------

/// What the arbiter should do with the silence timer after an interim result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCue {
    /// Cancel any pending timer and schedule a fresh one.
    Rearm,
    /// Cancel any pending timer; there is nothing worth finalizing yet.
    Cancel,
}

// ---------------------------------------------------------------------------
// UtteranceFinalizer
// ---------------------------------------------------------------------------

/// Per-session interim buffer with single-shot emission.
#[derive(Debug, Default)]
pub struct UtteranceFinalizer {
    pending: String,
    emitted: bool,
}

impl UtteranceFinalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest buffered interim text, for live display.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Record an interim transcript.  The buffer is overwritten, not
    /// appended — the device re-sends the full interim each time.
    pub fn on_partial(&mut self, text: &str) -> TimerCue {
        if self.emitted {
            return TimerCue::Cancel;
        }
        self.pending = text.to_string();
        if self.pending.trim().is_empty() {
            TimerCue::Cancel
        } else {
            TimerCue::Rearm
        }
    }

    /// Record a device-final transcript.  Non-empty final text finalizes
    /// immediately and takes precedence over the interim buffer; empty final
    /// text is ignored (the interim timer path stays responsible).
    pub fn on_final(&mut self, text: &str) -> Option<String> {
        if self.emitted {
            return None;
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        self.emit(trimmed.to_string())
    }

    /// The silence timer fired: finalize the buffered interim text, if any.
    pub fn on_silence_timeout(&mut self) -> Option<String> {
        if self.emitted {
            return None;
        }
        let trimmed = self.pending.trim();
        if trimmed.is_empty() {
            return None;
        }
        let utterance = trimmed.to_string();
        self.emit(utterance)
    }

    fn emit(&mut self, utterance: String) -> Option<String> {
        self.emitted = true;
        self.pending.clear();
        Some(utterance)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
