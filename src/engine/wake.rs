//! Wake-phrase detection over standby transcripts.
//!
//! While a capture session runs in standby mode, every transcript event is
//! lower-cased and checked for containment of any configured trigger phrase.
//! The detector latches after its first match: the session is about to be
//! torn down by the arbiter, and later transcript events from it must not
//! trigger a second boot sequence.

// ---------------------------------------------------------------------------
// WakePhraseSet
// ---------------------------------------------------------------------------

/// Ordered set of trigger phrases, matched case-insensitively as substrings.
#[derive(Debug, Clone)]
pub struct WakePhraseSet {
    phrases: Vec<String>,
}

impl WakePhraseSet {
    /// Build a set from configured phrases; matching is case-insensitive so
    /// the phrases are lower-cased once here.  Blank entries are dropped.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Returns `true` when `transcript` contains any trigger phrase.
    pub fn matches(&self, transcript: &str) -> bool {
        let lower = transcript.to_lowercase();
        self.phrases.iter().any(|p| lower.contains(p))
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

// ---------------------------------------------------------------------------
// WakeDetector
// ---------------------------------------------------------------------------

/// Per-session wake detector with a single-shot trigger.
#[derive(Debug)]
pub struct WakeDetector {
    phrases: WakePhraseSet,
    triggered: bool,
}

impl WakeDetector {
    pub fn new(phrases: WakePhraseSet) -> Self {
        Self {
            phrases,
            triggered: false,
        }
    }

    /// Feed a transcript event.  Returns `true` exactly once per session, on
    /// the first match; every later call returns `false`.
    pub fn observe(&mut self, transcript: &str) -> bool {
        if self.triggered {
            return false;
        }
        if self.phrases.matches(transcript) {
            self.triggered = true;
            return true;
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
