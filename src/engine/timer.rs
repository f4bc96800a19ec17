//! Cancellable delayed-event delivery.
//!
//! The engine never acts inside a timer callback.  A scheduled timer is a
//! spawned task that sleeps and then posts [`EngineEvent::TimerFired`] back
//! onto the engine channel, so timer handling goes through the same ordered
//! event loop as everything else.
//!
//! Cancellation is two-layered:
//!
//! * dropping the [`TimerGuard`] aborts the sleeping task, and
//! * the arbiter compares the fired [`TimerId`] against the guard it still
//!   holds, so a fire that raced a cancellation is discarded as stale.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::events::{EngineEvent, TimerId};

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Hands out cancellable timers that deliver [`EngineEvent::TimerFired`].
///
/// Timer ids are monotonically increasing and never reused, so a stale fire
/// can never collide with a newer timer's id.
#[derive(Debug)]
pub struct Scheduler {
    tx: mpsc::Sender<EngineEvent>,
    next_id: u64,
}

impl Scheduler {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx, next_id: 0 }
    }

    /// Schedule a fire after `delay`.  The timer lives exactly as long as the
    /// returned [`TimerGuard`].
    pub fn schedule(&mut self, delay: Duration) -> TimerGuard {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the engine is shutting down — nothing to do.
            let _ = tx.send(EngineEvent::TimerFired(id)).await;
        });

        TimerGuard { id, handle }
    }
}

// ---------------------------------------------------------------------------
// TimerGuard
// ---------------------------------------------------------------------------

/// Owning handle for one scheduled timer; dropping it cancels the timer.
#[derive(Debug)]
pub struct TimerGuard {
    id: TimerId,
    handle: JoinHandle<()>,
}

impl TimerGuard {
    /// The id this timer will fire with.
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Returns `true` when `fired` belongs to this timer.
    pub fn matches(&self, fired: TimerId) -> bool {
        self.id == fired
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
