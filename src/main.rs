//! Demo binary: runs the engine against a configured endpoint with stub
//! collaborators, or fully offline when the backend is unreachable.
//!
//! Configuration comes from the JSON config file plus `LEXI_WS_URL` /
//! `LEXI_SESSION_TOKEN` overrides (a `.env` file is honored during
//! development).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use lexi_session::{
    AudioCaptureHandle, CaptureDevice, CaptureError, ChatSender, ChatSink, Engine, EngineCommand,
    EngineConfig, Mode, PlaybackError, SpeechOutput,
};

/// Chat sink that renders the conversation to stdout.
struct ConsoleChat;

impl ChatSink for ConsoleChat {
    fn append(&self, text: &str, sender: ChatSender) {
        println!("[{}] {}", sender.as_str(), text);
    }
}

/// Speech output that narrates what it would do.
struct ConsoleSpeech;

impl SpeechOutput for ConsoleSpeech {
    fn speak(&self, text: &str) {
        println!("(speaking) {}", text);
    }

    fn play_encoded(&self, audio: &[u8]) -> Result<(), PlaybackError> {
        println!("(playing {} bytes of encoded audio)", audio.len());
        Ok(())
    }

    fn stop(&self) {
        println!("(speech stopped)");
    }
}

/// Synthetic device: emits small dummy audio chunks at the configured
/// cadence and a fixed one-pixel "camera frame".
struct SyntheticDevice;

impl CaptureDevice for SyntheticDevice {
    fn arm_audio(&self, chunk_interval: Duration) -> Result<AudioCaptureHandle, CaptureError> {
        let (tx, rx) = mpsc::channel(16);
        let live = Arc::new(AtomicBool::new(true));
        let flag = live.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(chunk_interval);
            let mut counter: u8 = 0;
            while flag.load(Ordering::SeqCst) {
                ticker.tick().await;
                counter = counter.wrapping_add(1);
                if tx.send(vec![counter; 320]).await.is_err() {
                    break;
                }
            }
        });

        Ok(AudioCaptureHandle::new(rx, live))
    }

    fn snapshot(&self) -> Result<Vec<u8>, CaptureError> {
        // Smallest valid-looking payload; a real device yields a JPEG/PNG
        Ok(vec![0x89, 0x50, 0x4E, 0x47])
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = EngineConfig::load();
    log::info!("Lexi session engine demo, endpoint {}", config.ws_url);

    let (engine, handle) = Engine::new(
        config,
        Arc::new(SyntheticDevice),
        Arc::new(ConsoleChat),
        Arc::new(ConsoleSpeech),
    );
    let loop_task = tokio::spawn(engine.run());

    // Scripted walk-through: consent, connect, pick a mode, say hello,
    // start the mic. The transport reconnects on its own if the backend
    // is down; the reading view keeps working offline meanwhile.
    handle.send(EngineCommand::GrantConsent).await;
    handle.send(EngineCommand::SelectMode(Mode::Book)).await;
    handle.send(EngineCommand::DemoVoice).await;
    handle.send(EngineCommand::ToggleMic).await;

    let mut reading = handle.reading_state();
    let render = tokio::spawn(async move {
        while reading.changed().await.is_ok() {
            let snapshot = reading.borrow_and_update().clone();
            if let (Some(mode), Some(index)) = (snapshot.mode, snapshot.highlight) {
                if let Some(word) = snapshot.units.get(index) {
                    println!("[{} {:>3}] {}", mode.as_str(), index, word);
                }
            }
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to wait for ctrl-c: {}", e);
    }

    log::info!("Shutting down");
    handle.send(EngineCommand::Shutdown).await;
    let _ = loop_task.await;
    render.abort();
}
