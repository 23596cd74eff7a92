//! Transport layer: one persistent WebSocket to the Lexi backend
//!
//! Split into a pure connection state machine (`link`), the wire types
//! (`protocol`), the bounded offline media buffer (`buffer`) and the actor
//! that drives the real socket (`connection`).

mod buffer;
mod connection;
mod link;
mod protocol;

pub use buffer::{BufferedFrame, CaptureBuffer};
pub use connection::{
    spawn_transport, RawFrame, TransportConfig, TransportEvent, TransportHandle,
};
pub use link::{reduce, LinkEffect, LinkEvent, LinkState};
pub use protocol::{decode_media, Envelope, Outbound, ServerEvent};
