//! Inbound event dispatcher
//!
//! Decodes each raw frame from the transport and routes it to the owner of
//! the corresponding state: chat text to the chat log, audio to the speech
//! output, and reading-state changes back to the engine as a
//! [`DispatchOutcome`]. Frames are handled strictly in arrival order; the
//! dispatcher never reorders or buffers.
//!
//! Malformed and binary frames are expected (a backend may interleave
//! diagnostics); they are logged and dropped, never fatal.

use std::sync::Arc;

use crate::reading::Mode;
use crate::transport::{decode_media, RawFrame, ServerEvent, TransportEvent};

/// Who a chat line is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatSender {
    User,
    Ai,
}

impl ChatSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatSender::User => "user",
            ChatSender::Ai => "ai",
        }
    }
}

/// Chat-log collaborator. Rendering is out of scope; the engine only
/// decides what to append and when.
pub trait ChatSink: Send + Sync {
    fn append(&self, text: &str, sender: ChatSender);
}

/// Failure while decoding or playing an inbound audio payload.
#[derive(Debug, Clone)]
pub struct PlaybackError(pub String);

impl std::fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "audio playback failed: {}", self.0)
    }
}

impl std::error::Error for PlaybackError {}

/// Speech-output collaborator: synthesized speech and encoded-audio
/// playback. The engine decides when to invoke it, never how it renders.
pub trait SpeechOutput: Send + Sync {
    fn speak(&self, text: &str);
    fn play_encoded(&self, audio: &[u8]) -> Result<(), PlaybackError>;
    fn stop(&self);
}

/// Reading-state changes the dispatcher cannot apply itself; the engine,
/// as the single owner of the reading state, applies them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing further to do; the frame was fully handled (or dropped).
    None,
    /// Authoritative server highlight override.
    HighlightOverride(usize),
    /// Server-initiated mode change, sequence replacement requested.
    ModeChange(Mode),
}

/// Maximum characters of an undecodable payload echoed into the log.
const DIAGNOSTIC_PREVIEW_CHARS: usize = 120;

/// Routes decoded inbound events to their owning collaborators.
pub struct Dispatcher {
    chat: Arc<dyn ChatSink>,
    speech: Arc<dyn SpeechOutput>,
}

impl Dispatcher {
    pub fn new(chat: Arc<dyn ChatSink>, speech: Arc<dyn SpeechOutput>) -> Self {
        Self { chat, speech }
    }

    /// Handle one transport event in arrival order.
    pub fn handle(&self, event: TransportEvent) -> DispatchOutcome {
        match event {
            TransportEvent::Notice(text) => {
                // Informational only: display, no state mutation
                self.chat.append(&text, ChatSender::Ai);
                DispatchOutcome::None
            }
            TransportEvent::Frame(RawFrame::Binary(bytes)) => {
                log::warn!("Dropping unexpected binary frame ({} bytes)", bytes.len());
                DispatchOutcome::None
            }
            TransportEvent::Frame(RawFrame::Text(text)) => {
                match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => self.route(event),
                    Err(e) => {
                        let preview: String =
                            text.chars().take(DIAGNOSTIC_PREVIEW_CHARS).collect();
                        log::warn!("Undecodable frame ({}): {:?}", e, preview);
                        DispatchOutcome::None
                    }
                }
            }
        }
    }

    fn route(&self, event: ServerEvent) -> DispatchOutcome {
        match event {
            ServerEvent::Text { message } => {
                self.chat.append(&message, ChatSender::Ai);
                DispatchOutcome::None
            }
            ServerEvent::Highlight { index } => DispatchOutcome::HighlightOverride(index),
            ServerEvent::Mode { mode } => match Mode::parse(&mode) {
                Some(mode) => DispatchOutcome::ModeChange(mode),
                None => {
                    log::warn!("Server pushed unknown mode {:?}, dropped", mode);
                    DispatchOutcome::None
                }
            },
            ServerEvent::AudioChunk { chunk } => {
                self.play_audio(&chunk);
                DispatchOutcome::None
            }
            ServerEvent::Unknown => {
                log::debug!("Ignoring unhandled server event type");
                DispatchOutcome::None
            }
        }
    }

    /// Decode and hand audio to the speech output. Bad encodings are
    /// reported to the user, never fatal.
    fn play_audio(&self, chunk: &str) {
        let bytes = match decode_media(chunk) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Inbound audio is not valid base64: {}", e);
                return;
            }
        };

        if let Err(e) = self.speech.play_encoded(&bytes) {
            log::warn!("{}", e);
            self.chat
                .append("Could not play the audio response.", ChatSender::Ai);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChat {
        lines: Mutex<Vec<(String, ChatSender)>>,
    }

    impl ChatSink for RecordingChat {
        fn append(&self, text: &str, sender: ChatSender) {
            self.lines.lock().unwrap().push((text.to_string(), sender));
        }
    }

    #[derive(Default)]
    struct RecordingSpeech {
        played: Mutex<Vec<Vec<u8>>>,
        fail_playback: bool,
    }

    impl SpeechOutput for RecordingSpeech {
        fn speak(&self, _text: &str) {}

        fn play_encoded(&self, audio: &[u8]) -> Result<(), PlaybackError> {
            if self.fail_playback {
                return Err(PlaybackError("unsupported codec".to_string()));
            }
            self.played.lock().unwrap().push(audio.to_vec());
            Ok(())
        }

        fn stop(&self) {}
    }

    fn dispatcher() -> (Dispatcher, Arc<RecordingChat>, Arc<RecordingSpeech>) {
        let chat = Arc::new(RecordingChat::default());
        let speech = Arc::new(RecordingSpeech::default());
        (
            Dispatcher::new(chat.clone(), speech.clone()),
            chat,
            speech,
        )
    }

    fn text_frame(json: &str) -> TransportEvent {
        TransportEvent::Frame(RawFrame::Text(json.to_string()))
    }

    #[test]
    fn chat_text_is_appended_as_ai() {
        let (dispatcher, chat, _) = dispatcher();

        let outcome = dispatcher.handle(text_frame(r#"{"type":"text","message":"Well done!"}"#));

        assert_eq!(outcome, DispatchOutcome::None);
        let lines = chat.lines.lock().unwrap();
        assert_eq!(lines.as_slice(), &[("Well done!".to_string(), ChatSender::Ai)]);
    }

    #[test]
    fn highlight_is_forwarded_as_override() {
        let (dispatcher, _, _) = dispatcher();

        let outcome = dispatcher.handle(text_frame(r#"{"type":"highlight","index":4}"#));
        assert_eq!(outcome, DispatchOutcome::HighlightOverride(4));
    }

    #[test]
    fn known_mode_becomes_a_mode_change() {
        let (dispatcher, _, _) = dispatcher();

        let outcome = dispatcher.handle(text_frame(r#"{"type":"mode","mode":"study"}"#));
        assert_eq!(outcome, DispatchOutcome::ModeChange(Mode::Study));
    }

    #[test]
    fn unknown_mode_is_dropped() {
        let (dispatcher, _, _) = dispatcher();

        let outcome = dispatcher.handle(text_frame(r#"{"type":"mode","mode":"karaoke"}"#));
        assert_eq!(outcome, DispatchOutcome::None);
    }

    #[test]
    fn audio_chunk_is_decoded_and_played() {
        let (dispatcher, _, speech) = dispatcher();
        let payload = STANDARD.encode(b"opus");

        let frame = format!(r#"{{"type":"audio_chunk","chunk":"{}"}}"#, payload);
        dispatcher.handle(text_frame(&frame));

        let played = speech.played.lock().unwrap();
        assert_eq!(played.as_slice(), &[b"opus".to_vec()]);
    }

    #[test]
    fn playback_failure_is_reported_in_chat() {
        let chat = Arc::new(RecordingChat::default());
        let speech = Arc::new(RecordingSpeech {
            fail_playback: true,
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(chat.clone(), speech);
        let payload = STANDARD.encode(b"opus");

        let frame = format!(r#"{{"type":"audio_chunk","chunk":"{}"}}"#, payload);
        dispatcher.handle(text_frame(&frame));

        let lines = chat.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].0.contains("Could not play"));
    }

    #[test]
    fn malformed_frames_do_not_crash_or_route() {
        let (dispatcher, chat, _) = dispatcher();

        assert_eq!(dispatcher.handle(text_frame("not json at all")), DispatchOutcome::None);
        assert_eq!(
            dispatcher.handle(text_frame(r#"{"type":"highlight"}"#)),
            DispatchOutcome::None
        );
        assert_eq!(
            dispatcher.handle(TransportEvent::Frame(RawFrame::Binary(vec![0, 1, 2]))),
            DispatchOutcome::None
        );
        assert!(chat.lines.lock().unwrap().is_empty());
    }

    #[test]
    fn connection_notice_is_display_only() {
        let (dispatcher, chat, _) = dispatcher();

        let outcome = dispatcher.handle(TransportEvent::Notice(
            "Connection lost. Reconnecting...".to_string(),
        ));

        assert_eq!(outcome, DispatchOutcome::None);
        let lines = chat.lines.lock().unwrap();
        assert!(lines[0].0.contains("Connection lost"));
    }

    #[test]
    fn chat_sender_wire_names() {
        assert_eq!(ChatSender::User.as_str(), "user");
        assert_eq!(ChatSender::Ai.as_str(), "ai");
    }
}
