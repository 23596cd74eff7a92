//! Wire protocol for the Lexi session socket
//!
//! All frames are JSON text frames over the persistent WebSocket. Media
//! payloads (audio chunks, snapshots, uploads) are base64-wrapped inside
//! JSON rather than sent as raw binary frames; one representation, used
//! consistently for every media path.
//!
//! # Protocol Overview
//!
//! Outbound: `mode_selected`, `audio_chunk`, `snapshot`, `stop`, `explain`,
//! each wrapped in an envelope carrying the session id and, when configured,
//! a session token.
//!
//! Inbound: `text`, `highlight`, `mode`, `audio_chunk`. Unknown types
//! deserialize to [`ServerEvent::Unknown`] so a newer backend never crashes
//! an older client.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from the client to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Outbound {
    /// One captured audio chunk, base64-encoded.
    #[serde(rename = "audio_chunk")]
    AudioChunk { chunk: String },

    /// One captured camera frame or accepted upload, base64-encoded.
    #[serde(rename = "snapshot")]
    Snapshot { frame: String },

    /// Locally initiated mode change, so both sides agree on the active mode.
    #[serde(rename = "mode_selected")]
    ModeSelected { mode: String },

    /// Stop any in-flight server speech for this session.
    #[serde(rename = "stop")]
    Stop,

    /// Ask the backend for a simpler explanation of the current text.
    #[serde(rename = "explain")]
    Explain,
}

impl Outbound {
    /// Build an audio chunk message from raw capture bytes.
    pub fn audio_chunk(bytes: &[u8]) -> Self {
        Outbound::AudioChunk {
            chunk: STANDARD.encode(bytes),
        }
    }

    /// Build a snapshot message from raw image/document bytes.
    pub fn snapshot(bytes: &[u8]) -> Self {
        Outbound::Snapshot {
            frame: STANDARD.encode(bytes),
        }
    }

    pub fn mode_selected(mode: &str) -> Self {
        Outbound::ModeSelected {
            mode: mode.to_string(),
        }
    }

    /// Media messages are buffered while disconnected; control messages
    /// depend on a live turn and are dropped instead.
    pub fn is_media(&self) -> bool {
        matches!(self, Outbound::AudioChunk { .. } | Outbound::Snapshot { .. })
    }
}

/// Envelope that enriches an outbound message with the session identity
/// just before transmission.
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    #[serde(flatten)]
    pub message: &'a Outbound,
    pub session: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<&'a str>,
}

impl<'a> Envelope<'a> {
    pub fn new(message: &'a Outbound, session: Uuid, session_token: Option<&'a str>) -> Self {
        Self {
            message,
            session,
            session_token,
        }
    }
}

/// Display-control events pushed by the backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Chat text to append to the conversation log.
    #[serde(rename = "text")]
    Text { message: String },

    /// Authoritative highlight override for the active sequence.
    #[serde(rename = "highlight")]
    Highlight { index: usize },

    /// Server-initiated mode change. The name is validated against the
    /// closed mode set by the dispatcher, not here, so an unknown mode is
    /// a routable protocol error rather than a decode failure.
    #[serde(rename = "mode")]
    Mode { mode: String },

    /// Encoded audio for the speech-output collaborator, base64.
    #[serde(rename = "audio_chunk")]
    AudioChunk { chunk: String },

    /// Catch-all for event types this client does not handle.
    #[serde(other)]
    Unknown,
}

/// Decode a base64 media payload from an inbound event.
pub fn decode_media(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_chunk_serializes_with_type_tag_and_base64_payload() {
        let msg = Outbound::audio_chunk(&[1u8, 2, 3]);
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"type\":\"audio_chunk\""));
        if let Outbound::AudioChunk { chunk } = &msg {
            assert_eq!(STANDARD.decode(chunk).unwrap(), vec![1, 2, 3]);
        } else {
            panic!("Expected AudioChunk");
        }
    }

    #[test]
    fn snapshot_serializes_with_frame_field() {
        let msg = Outbound::snapshot(b"jpegbytes");
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"type\":\"snapshot\""));
        assert!(json.contains("\"frame\":"));
    }

    #[test]
    fn mode_selected_carries_mode_name() {
        let json = serde_json::to_string(&Outbound::mode_selected("book")).unwrap();
        assert!(json.contains("\"type\":\"mode_selected\""));
        assert!(json.contains("\"mode\":\"book\""));
    }

    #[test]
    fn control_messages_serialize_to_bare_type_tags() {
        assert_eq!(
            serde_json::to_string(&Outbound::Stop).unwrap(),
            r#"{"type":"stop"}"#
        );
        assert_eq!(
            serde_json::to_string(&Outbound::Explain).unwrap(),
            r#"{"type":"explain"}"#
        );
    }

    #[test]
    fn media_classification() {
        assert!(Outbound::audio_chunk(&[0]).is_media());
        assert!(Outbound::snapshot(&[0]).is_media());
        assert!(!Outbound::mode_selected("book").is_media());
        assert!(!Outbound::Stop.is_media());
        assert!(!Outbound::Explain.is_media());
    }

    #[test]
    fn envelope_flattens_message_and_adds_session() {
        let session = Uuid::new_v4();
        let msg = Outbound::mode_selected("study");
        let envelope = Envelope::new(&msg, session, Some("tok-123"));
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&envelope).unwrap()).unwrap();

        assert_eq!(value["type"], "mode_selected");
        assert_eq!(value["mode"], "study");
        assert_eq!(value["session"], session.to_string());
        assert_eq!(value["session_token"], "tok-123");
    }

    #[test]
    fn envelope_omits_missing_token() {
        let msg = Outbound::Stop;
        let envelope = Envelope::new(&msg, Uuid::new_v4(), None);
        let json = serde_json::to_string(&envelope).unwrap();

        assert!(!json.contains("session_token"));
    }

    #[test]
    fn server_text_event_deserializes() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"text","message":"Hello"}"#).unwrap();
        match event {
            ServerEvent::Text { message } => assert_eq!(message, "Hello"),
            other => panic!("Expected Text, got {:?}", other),
        }
    }

    #[test]
    fn server_highlight_event_deserializes() {
        let event: ServerEvent = serde_json::from_str(r#"{"type":"highlight","index":7}"#).unwrap();
        assert!(matches!(event, ServerEvent::Highlight { index: 7 }));
    }

    #[test]
    fn negative_highlight_index_fails_decode() {
        let result = serde_json::from_str::<ServerEvent>(r#"{"type":"highlight","index":-1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_event_type_decodes_to_unknown() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"telemetry.v2","data":42}"#).unwrap();
        assert!(matches!(event, ServerEvent::Unknown));
    }

    #[test]
    fn decode_media_round_trips() {
        let encoded = STANDARD.encode(b"opus-frame");
        assert_eq!(decode_media(&encoded).unwrap(), b"opus-frame");
        assert!(decode_media("not base64!!!").is_err());
    }
}
