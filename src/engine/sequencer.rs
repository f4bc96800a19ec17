//! Response playback sequencing — text cleanup, sentence chunking, and the
//! one-chunk-in-flight cursor.
//!
//! Response text arrives as chat markdown; [`clean_for_speech`] strips the
//! things a voice should not read aloud (widget markers, code fences, URLs,
//! markup), then [`split_chunks`] cuts the result at sentence-terminal
//! punctuation.  [`PlaybackSequencer`] owns the chunk list and cursor; the
//! arbiter pulls one [`SpokenChunk`] at a time and waits for the playback
//! adapter's end/error event before pulling the next, so chunks are spoken
//! strictly in order with never more than one in flight.

use rand::Rng;

use crate::config::VoiceCalibration;
use crate::skin::{PlaybackParams, VoiceSkinProfile};

use super::events::SequenceId;

// ---------------------------------------------------------------------------
// clean_for_speech
// ---------------------------------------------------------------------------

/// Rewrite chat markdown into something speakable.
///
/// * `[[WIDGET:…]]` markers become "Displaying requested data."
/// * fenced code blocks become "Code block generated."
/// * URLs become "Link attached."
/// * HTML tags are removed
/// * markdown control characters (`*`, `#`, `` ` ``, `_`, `[`, `]`) are
///   stripped
pub fn clean_for_speech(text: &str) -> String {
    let mut s = replace_delimited(text, "[[WIDGET:", "]]", "Displaying requested data.");
    s = replace_delimited(&s, "```", "```", "Code block generated.");
    s = replace_urls(&s);
    s = strip_delimited(&s, '<', '>');
    s.retain(|c| !matches!(c, '*' | '#' | '`' | '_' | '[' | ']'));
    s.trim().to_string()
}

/// Replace every `open…close` span (inclusive) with `replacement`.
/// An unmatched `open` is left in place.
fn replace_delimited(text: &str, open: &str, close: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(open) {
        let after_open = start + open.len();
        match rest[after_open..].find(close) {
            Some(rel) => {
                out.push_str(&rest[..start]);
                out.push_str(replacement);
                rest = &rest[after_open + rel + close.len()..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

/// Replace every whitespace-delimited `http(s)://…` run with "Link attached."
fn replace_urls(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let start = match (rest.find("http://"), rest.find("https://")) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => break,
        };
        let end = rest[start..]
            .find(char::is_whitespace)
            .map(|rel| start + rel)
            .unwrap_or(rest.len());
        out.push_str(&rest[..start]);
        out.push_str("Link attached.");
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

/// Remove every complete `open…close` character span (inclusive).  An
/// `open` with no later `close` is left in place, as is everything after it.
fn strip_delimited(text: &str, open: char, close: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(open) {
        let after_open = start + open.len_utf8();
        match rest[after_open..].find(close) {
            Some(rel) => {
                out.push_str(&rest[..start]);
                rest = &rest[after_open + rel + close.len_utf8()..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// split_chunks
// ---------------------------------------------------------------------------

/// Split `text` into sentence chunks at terminal punctuation (`.`, `!`, `?`).
///
/// Consecutive terminals stay attached to their sentence ("Really?!" is one
/// chunk).  A trailing run with no terminal punctuation becomes the final
/// chunk; text containing no terminal punctuation at all is a single chunk.
/// Whitespace-only chunks are dropped.
pub fn split_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut in_terminal_run = false;

    for c in text.chars() {
        let terminal = matches!(c, '.' | '!' | '?');
        if in_terminal_run && !terminal {
            push_chunk(&mut chunks, &mut current);
            in_terminal_run = false;
        }
        current.push(c);
        if terminal {
            in_terminal_run = true;
        }
    }
    push_chunk(&mut chunks, &mut current);
    chunks
}

fn push_chunk(chunks: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    current.clear();
}

// ---------------------------------------------------------------------------
// SpokenChunk / PlaybackSequencer
// ---------------------------------------------------------------------------

/// One chunk handed to the playback adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct SpokenChunk {
    /// Position within the sequence, starting at 0.
    pub index: usize,
    /// Text to synthesize (already override-resolved).
    pub text: String,
    /// Synthesis parameters for this chunk.
    pub params: PlaybackParams,
}

/// Ephemeral queue of chunks plus cursor for one playback sequence.
#[derive(Debug)]
pub struct PlaybackSequencer {
    id: SequenceId,
    chunks: Vec<String>,
    cursor: usize,
    profile: VoiceSkinProfile,
    calibration: VoiceCalibration,
}

impl PlaybackSequencer {
    /// Build a sequence from raw response text.  Returns `None` when nothing
    /// speakable remains after cleanup, so the caller can skip the playback
    /// phase entirely.
    pub fn new(
        id: SequenceId,
        text: &str,
        profile: VoiceSkinProfile,
        calibration: VoiceCalibration,
    ) -> Option<Self> {
        let chunks = split_chunks(&clean_for_speech(text));
        if chunks.is_empty() {
            return None;
        }
        Some(Self {
            id,
            chunks,
            cursor: 0,
            profile,
            calibration,
        })
    }

    pub fn id(&self) -> SequenceId {
        self.id
    }

    /// Total chunk count.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Index of the chunk currently handed to the playback adapter, or
    /// `None` before the first [`next_chunk`](Self::next_chunk) call.  End
    /// and error events are matched against this as well as the sequence id,
    /// so a duplicated completion cannot advance the cursor twice.
    pub fn in_flight(&self) -> Option<usize> {
        self.cursor.checked_sub(1)
    }

    /// Advance the cursor and build the next chunk, re-evaluating jittered
    /// skin parameters.  Returns `None` when the queue is exhausted.
    pub fn next_chunk(&mut self, rng: &mut impl Rng) -> Option<SpokenChunk> {
        let chunk = self.chunks.get(self.cursor)?;
        let index = self.cursor;
        self.cursor += 1;

        let params = self.profile.params_for_chunk(&self.calibration, rng);
        let text = self.profile.spoken_text(chunk).to_string();

        Some(SpokenChunk {
            index,
            text,
            params,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
