//! Boot greeting composed after a wake phrase brings the assistant online.
//!
//! The greeting is time-of-day aware and ends with a randomly chosen prompt,
//! so consecutive wake-ups do not sound canned.

use chrono::Timelike;
use rand::Rng;

// ---------------------------------------------------------------------------
// boot_greeting
// ---------------------------------------------------------------------------

const PROMPTS: [&str; 4] = [
    "How may I assist you?",
    "Systems at your command.",
    "How are you feeling?",
    "What is your directive?",
];

/// Compose the greeting for `hour` (0..=23) in local time.
///
/// 05:00–11:59 is Morning, 12:00–16:59 is Afternoon, everything else Evening.
pub fn boot_greeting(master_name: &str, hour: u32, rng: &mut impl Rng) -> String {
    let time_phrase = if (5..12).contains(&hour) {
        "Morning"
    } else if (12..17).contains(&hour) {
        "Afternoon"
    } else {
        "Evening"
    };
    let prompt = PROMPTS[rng.gen_range(0..PROMPTS.len())];
    format!("Good {time_phrase}, {master_name}. Systems Online. {prompt}")
}

/// [`boot_greeting`] evaluated against the local wall clock.
pub fn boot_greeting_now(master_name: &str, rng: &mut impl Rng) -> String {
    boot_greeting(master_name, chrono::Local::now().hour(), rng)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
