//! Engine event loop
//!
//! Single-threaded heart of the session: one loop owns the reading state,
//! the dispatcher, the capture pipeline and the transport handle, and is
//! driven by three sources: user commands, transport events and the local
//! highlight fallback timer. All cross-component traffic is explicit
//! channel handoff; nothing here is shared mutable state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};

use crate::capture::{CaptureDevice, CapturePipeline};
use crate::config::EngineConfig;
use crate::dispatch::{ChatSender, ChatSink, DispatchOutcome, Dispatcher, SpeechOutput};
use crate::reading::{Mode, ReadingSnapshot, ReadingState};
use crate::session::Session;
use crate::transport::{
    spawn_transport, Outbound, TransportConfig, TransportEvent, TransportHandle,
};
use crate::upload::{self, UploadCandidate, UploadVerdict};

/// Commands accepted by the engine, from UI wiring or the demo binary.
#[derive(Debug)]
pub enum EngineCommand {
    /// The user acknowledged data collection. Creates the session and
    /// begins connecting. Idempotent.
    GrantConsent,
    /// (Re)start the connection. Refused with a notice before consent.
    Start,
    /// Toggle the microphone on or off.
    ToggleMic,
    /// Capture and send a single camera frame.
    Snapshot,
    /// Locally initiated mode change.
    SelectMode(Mode),
    /// Offer a file for upload; validated by the upload gate first.
    Upload {
        file_name: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
    /// Stop speech locally and tell the backend to stop its turn.
    StopSpeech,
    /// Ask for a simpler explanation of the current text.
    Explain,
    /// Offline demo voice line.
    DemoVoice,
    /// Tear down capture and transport, then exit the loop.
    Shutdown,
}

/// Cloneable handle for driving a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    ui_rx: watch::Receiver<ReadingSnapshot>,
}

impl EngineHandle {
    pub async fn send(&self, command: EngineCommand) {
        if self.cmd_tx.send(command).await.is_err() {
            log::warn!("Engine loop is gone, command dropped");
        }
    }

    /// Observe the reading state; updated after every sequence or
    /// highlight change.
    pub fn reading_state(&self) -> watch::Receiver<ReadingSnapshot> {
        self.ui_rx.clone()
    }
}

pub struct Engine {
    config: EngineConfig,
    device: Arc<dyn CaptureDevice>,
    chat: Arc<dyn ChatSink>,
    speech: Arc<dyn SpeechOutput>,
    dispatcher: Dispatcher,
    cmd_rx: mpsc::Receiver<EngineCommand>,
    /// Kept so the transport (spawned later, at consent) can be wired into
    /// the already-running loop.
    event_tx: mpsc::Sender<TransportEvent>,
    event_rx: mpsc::Receiver<TransportEvent>,
    ui_tx: watch::Sender<ReadingSnapshot>,
    session: Option<Session>,
    transport: Option<TransportHandle>,
    pipeline: Option<CapturePipeline>,
    reading: ReadingState,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        device: Arc<dyn CaptureDevice>,
        chat: Arc<dyn ChatSink>,
        speech: Arc<dyn SpeechOutput>,
    ) -> (Engine, EngineHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::channel(64);
        let (ui_tx, ui_rx) = watch::channel(ReadingSnapshot::default());
        let dispatcher = Dispatcher::new(chat.clone(), speech.clone());

        let engine = Engine {
            config,
            device,
            chat,
            speech,
            dispatcher,
            cmd_rx,
            event_tx,
            event_rx,
            ui_tx,
            session: None,
            transport: None,
            pipeline: None,
            reading: ReadingState::new(),
        };

        (engine, EngineHandle { cmd_tx, ui_rx })
    }

    /// Run until shutdown. Consumes the engine.
    pub async fn run(mut self) {
        let period = Duration::from_millis(self.config.highlight_interval_ms);
        let mut highlight = tokio::time::interval(period);
        highlight.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!("Engine loop started");

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    None => break,
                    Some(EngineCommand::Shutdown) => {
                        self.shutdown().await;
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd, &mut highlight).await,
                },
                event = self.event_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_transport_event(event, &mut highlight).await;
                    }
                }
                _ = highlight.tick() => {
                    // Local fallback advance; overridden whenever the
                    // server pushes a highlight
                    if self.reading.highlight().is_some() {
                        self.reading.tick();
                        self.publish();
                    }
                }
            }
        }

        log::info!("Engine loop ended");
    }

    async fn handle_command(&mut self, cmd: EngineCommand, highlight: &mut Interval) {
        log::debug!("Engine command: {:?}", cmd);
        match cmd {
            EngineCommand::GrantConsent => self.grant_consent().await,
            EngineCommand::Start => match &self.transport {
                Some(transport) => transport.start().await,
                None => self.consent_notice(),
            },
            EngineCommand::ToggleMic => self.toggle_mic().await,
            EngineCommand::Snapshot => self.take_snapshot().await,
            EngineCommand::SelectMode(mode) => {
                self.reading.set_mode(mode);
                highlight.reset();
                self.publish();
                // Tell the backend; dropped by the transport when offline,
                // since mode selection has no server to apply to then
                if let Some(transport) = &self.transport {
                    transport.send(Outbound::mode_selected(mode.as_str())).await;
                }
            }
            EngineCommand::Upload {
                file_name,
                mime_type,
                bytes,
            } => self.upload(file_name, mime_type, bytes).await,
            EngineCommand::StopSpeech => {
                // Cancel local synthesis immediately, then the server turn
                self.speech.stop();
                if let Some(transport) = &self.transport {
                    transport.send(Outbound::Stop).await;
                }
            }
            EngineCommand::Explain => match &self.transport {
                Some(transport) => transport.send(Outbound::Explain).await,
                None => {
                    let msg = "Here is a simpler explanation of the text.";
                    self.speech.speak(msg);
                    self.chat.append(msg, ChatSender::Ai);
                }
            },
            EngineCommand::DemoVoice => {
                let msg = "Hello. I am Lexi. I will read this text for you.";
                self.speech.speak(msg);
                self.chat.append(msg, ChatSender::Ai);
            }
            // Handled in run()
            EngineCommand::Shutdown => {}
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent, highlight: &mut Interval) {
        match self.dispatcher.handle(event) {
            DispatchOutcome::HighlightOverride(index) => {
                if self.reading.apply_server_highlight(index) {
                    // Server guidance postpones the next local tick
                    highlight.reset();
                    self.publish();
                }
            }
            DispatchOutcome::ModeChange(mode) => {
                self.reading.set_mode(mode);
                highlight.reset();
                self.publish();
            }
            DispatchOutcome::None => {}
        }
    }

    async fn grant_consent(&mut self) {
        if self.session.is_some() {
            if let Some(transport) = &self.transport {
                transport.start().await;
            }
            return;
        }

        let session = Session::new();
        let transport = spawn_transport(
            TransportConfig {
                url: self.config.ws_url.clone(),
                session_id: session.id,
                session_token: self.config.session_token.clone(),
                reconnect_delay: Duration::from_millis(self.config.reconnect_delay_ms),
                buffer_capacity: self.config.capture_buffer_frames,
            },
            self.event_tx.clone(),
        );
        transport.start().await;

        self.pipeline = Some(CapturePipeline::new(
            self.device.clone(),
            transport.clone(),
            Duration::from_millis(self.config.audio_chunk_ms),
        ));
        self.transport = Some(transport);
        self.session = Some(session);
    }

    async fn toggle_mic(&mut self) {
        let Some(pipeline) = self.pipeline.as_mut() else {
            self.consent_notice();
            return;
        };

        if pipeline.is_recording() {
            pipeline.stop_audio();
            return;
        }

        match pipeline.arm_audio().await {
            Ok(()) => self.chat.append("Listening...", ChatSender::User),
            Err(e) => {
                log::warn!("Audio capture failed: {}", e);
                self.chat
                    .append(&format!("Microphone unavailable: {}", e), ChatSender::Ai);
            }
        }
    }

    async fn take_snapshot(&mut self) {
        let Some(pipeline) = self.pipeline.as_ref() else {
            self.consent_notice();
            return;
        };

        match pipeline.snapshot().await {
            Ok(()) => self.chat.append("Snapshot captured.", ChatSender::Ai),
            Err(e) => {
                log::warn!("Snapshot failed: {}", e);
                self.chat
                    .append(&format!("Camera unavailable: {}", e), ChatSender::Ai);
            }
        }
    }

    /// Validate an offered file; accepted uploads travel the snapshot
    /// frame path, rejections surface inline.
    async fn upload(&mut self, file_name: String, mime_type: String, bytes: Vec<u8>) {
        let candidate = UploadCandidate {
            file_name: file_name.clone(),
            mime_type,
            size_bytes: bytes.len() as u64,
        };

        match upload::validate(&candidate) {
            UploadVerdict::Accepted => match &self.transport {
                Some(transport) => {
                    transport.send(Outbound::snapshot(&bytes)).await;
                    self.chat
                        .append(&format!("Uploaded {}.", file_name), ChatSender::User);
                }
                None => self.consent_notice(),
            },
            UploadVerdict::Rejected(reason) => {
                log::info!("Upload {:?} rejected: {}", file_name, reason);
                self.chat.append(
                    &format!("Cannot upload {}: {}.", file_name, reason),
                    ChatSender::Ai,
                );
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.stop_audio();
        }
        if let Some(transport) = &self.transport {
            transport.stop().await;
        }
    }

    fn consent_notice(&self) {
        log::warn!("Refused: no session, consent not granted yet");
        self.chat.append(
            "Please allow camera and microphone access to start a session.",
            ChatSender::Ai,
        );
    }

    fn publish(&self) {
        self.ui_tx.send_replace(self.reading.snapshot());
    }
}
