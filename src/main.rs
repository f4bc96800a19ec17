//! Console harness — drives the engine with stdin/stdout adapters.
//!
//! Each stdin line is delivered to the engine as a final transcript, playback
//! chunks are printed instead of synthesized, and the dispatcher echoes the
//! utterance back.  Useful for exercising the full wake → converse → speak
//! loop without audio hardware.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`EngineConfig`] from disk (returns default on first run).
//! 3. Build the console adapters and spawn the stdin reader.
//! 4. Spawn the arbiter task and enable wake-phrase standby.
//! 5. Wait for Ctrl-C, then shut the engine down.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use marco_voice::{
    adapters::{CaptureAdapter, PlaybackAdapter, ResponseDispatcher},
    config::EngineConfig,
    engine::{
        CaptureErrorKind, CaptureMode, EndReason, EngineEvent, SequenceId, SessionId, SpokenChunk,
        VoiceArbiter,
    },
};

// ---------------------------------------------------------------------------
// StdinCapture — capture adapter backed by stdin lines
// ---------------------------------------------------------------------------

/// Delivers every stdin line as a final transcript of the live session.
///
/// Lines typed while no session is live are dropped, mirroring a microphone
/// nobody is listening to.
struct StdinCapture {
    live: Mutex<Option<(SessionId, mpsc::Sender<EngineEvent>)>>,
}

impl StdinCapture {
    fn new() -> Self {
        Self {
            live: Mutex::new(None),
        }
    }

    /// Spawn the single stdin reader task feeding whichever session is live.
    fn spawn_reader(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let target = this.live.lock().unwrap().clone();
                match target {
                    Some((id, tx)) => {
                        let _ = tx.send(EngineEvent::FinalResult(id, line)).await;
                    }
                    None => log::debug!("capture: no live session, line dropped"),
                }
            }
            log::info!("capture: stdin closed");
        });
    }
}

#[async_trait]
impl CaptureAdapter for StdinCapture {
    async fn start(
        &self,
        session: SessionId,
        mode: CaptureMode,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<(), CaptureErrorKind> {
        *self.live.lock().unwrap() = Some((session, events.clone()));
        log::info!("capture: {session:?} live ({mode:?})");
        let _ = events.send(EngineEvent::SessionStarted(session)).await;
        Ok(())
    }

    async fn stop(&self) {
        let live = self.live.lock().unwrap().take();
        if let Some((id, tx)) = live {
            log::info!("capture: {id:?} stopped");
            let _ = tx
                .send(EngineEvent::SessionEnded(id, EndReason::Requested))
                .await;
        }
    }
}

// ---------------------------------------------------------------------------
// ConsolePlayback — prints chunks instead of synthesizing them
// ---------------------------------------------------------------------------

struct ConsolePlayback;

#[async_trait]
impl PlaybackAdapter for ConsolePlayback {
    async fn speak(
        &self,
        sequence: SequenceId,
        chunk: SpokenChunk,
        events: mpsc::Sender<EngineEvent>,
    ) {
        println!(
            ">> [pitch {:.2} rate {:.2}] {}",
            chunk.params.pitch, chunk.params.rate, chunk.text
        );
        let _ = events
            .send(EngineEvent::ChunkEnded(sequence, chunk.index))
            .await;
    }

    async fn cancel_all(&self) {
        log::debug!("playback: cancel_all");
    }
}

// ---------------------------------------------------------------------------
// EchoDispatcher — replies with the utterance it received
// ---------------------------------------------------------------------------

struct EchoDispatcher;

#[async_trait]
impl ResponseDispatcher for EchoDispatcher {
    async fn dispatch(&self, utterance: &str) -> anyhow::Result<Option<String>> {
        Ok(Some(format!("Acknowledged. You said: {utterance}.")))
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("marco-voice console harness starting up");

    // 2. Configuration
    let config = EngineConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        EngineConfig::default()
    });
    let wake_hint = config
        .wake
        .phrases
        .first()
        .cloned()
        .unwrap_or_else(|| "hey marco".into());

    // 3. Adapters
    let capture = Arc::new(StdinCapture::new());
    capture.spawn_reader();

    // 4. Engine
    let (arbiter, handle) = VoiceArbiter::new(
        config,
        Arc::clone(&capture) as Arc<dyn CaptureAdapter>,
        Arc::new(ConsolePlayback),
        Arc::new(EchoDispatcher),
        None,
    );
    let engine = tokio::spawn(arbiter.run());

    println!("Standby. Type \"{wake_hint}\" to wake the assistant, then chat.");
    println!("Ctrl-C exits.");
    handle.set_wake_word_enabled(true).await;

    // 5. Run until interrupted
    tokio::signal::ctrl_c().await?;
    log::info!("interrupt received, shutting down");
    handle.shutdown().await;
    engine.await?;

    Ok(())
}
