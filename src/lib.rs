//! Realtime session synchronization engine for the Lexi assisted-reading
//! client.
//!
//! Owns the connection lifecycle to the backend, multiplexes the three
//! realtime flows (outbound audio chunks, outbound image frames, inbound
//! display-control events) and keeps the client-observable state
//! (connection status, active reading mode, highlighted word) consistent
//! with the server under an unreliable network.
//!
//! Collaborators the engine drives but does not implement: the capture
//! device ([`capture::CaptureDevice`]), speech output
//! ([`dispatch::SpeechOutput`]) and the chat log ([`dispatch::ChatSink`]).

pub mod capture;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod reading;
pub mod session;
pub mod transport;
pub mod upload;

pub use capture::{AudioCaptureHandle, CaptureDevice, CaptureError, CapturePipeline};
pub use config::EngineConfig;
pub use dispatch::{ChatSender, ChatSink, DispatchOutcome, Dispatcher, PlaybackError, SpeechOutput};
pub use engine::{Engine, EngineCommand, EngineHandle};
pub use reading::{Mode, ReadingSnapshot, ReadingState};
pub use session::Session;
pub use transport::{
    spawn_transport, LinkState, Outbound, ServerEvent, TransportConfig, TransportEvent,
    TransportHandle,
};
pub use upload::{validate, RejectReason, UploadCandidate, UploadVerdict};
