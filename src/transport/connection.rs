//! Transport actor: drives one WebSocket per the link state machine
//!
//! The actor is the only task that touches the socket, the connection state
//! and the capture buffer. Callers talk to it through a [`TransportHandle`];
//! inbound frames and locally synthesized connection notices flow out
//! through a single [`TransportEvent`] channel, in arrival order, to the
//! dispatcher.
//!
//! Reconnection is unconditional and indefinite: any unexpected close arms
//! a fixed-delay timer and tries again, forever, until a deliberate stop.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
    MaybeTlsStream, WebSocketStream,
};
use uuid::Uuid;

use super::buffer::CaptureBuffer;
use super::link::{reduce, LinkEffect, LinkEvent, LinkState};
use super::protocol::{Envelope, Outbound};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport configuration, fixed for the lifetime of the actor.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket endpoint, configured once at startup.
    pub url: String,
    /// Session id attached to every outbound envelope.
    pub session_id: Uuid,
    /// Optional bearer token, sent at the handshake and in envelopes.
    pub session_token: Option<String>,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Capacity bound of the capture buffer, in frames.
    pub buffer_capacity: usize,
}

/// Commands accepted by the transport actor.
#[derive(Debug)]
enum TransportCmd {
    Start,
    Stop,
    Send(Outbound),
    DiscardBufferedAudio,
}

/// A raw frame received from the socket, before any decoding.
#[derive(Debug, Clone)]
pub enum RawFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Everything the transport hands to its single consumer.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// An inbound frame, in arrival order.
    Frame(RawFrame),
    /// Locally synthesized connection notice for display.
    Notice(String),
}

/// Cloneable handle to a running transport actor.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    cmd_tx: mpsc::Sender<TransportCmd>,
}

impl TransportHandle {
    /// Begin connecting. No-op while already Connecting/Open; failures are
    /// internal and recovered by the retry timer.
    pub async fn start(&self) {
        self.dispatch(TransportCmd::Start).await;
    }

    /// Deliberate shutdown; suppresses further reconnection.
    pub async fn stop(&self) {
        self.dispatch(TransportCmd::Stop).await;
    }

    /// Enqueue a message. While disconnected, media is buffered and control
    /// messages are dropped.
    pub async fn send(&self, message: Outbound) {
        self.dispatch(TransportCmd::Send(message)).await;
    }

    /// Discard buffered audio chunks, e.g. when a fresh capture session
    /// starts. Buffered snapshots and uploads stay queued.
    pub async fn discard_buffered_audio(&self) {
        self.dispatch(TransportCmd::DiscardBufferedAudio).await;
    }

    async fn dispatch(&self, cmd: TransportCmd) {
        if self.cmd_tx.send(cmd).await.is_err() {
            log::warn!("Transport actor is gone, command dropped");
        }
    }
}

/// Spawn the transport actor. Decoded frames and notices arrive on
/// `event_tx`; the actor exits when every handle is dropped.
pub fn spawn_transport(
    config: TransportConfig,
    event_tx: mpsc::Sender<TransportEvent>,
) -> TransportHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    tokio::spawn(run_actor(config, cmd_rx, event_tx));
    TransportHandle { cmd_tx }
}

/// Internal signals from connect tasks, the reader task and the retry timer.
enum Signal {
    Connected {
        generation: u64,
        stream: Box<WsStream>,
    },
    ConnectFailed {
        generation: u64,
        reason: String,
    },
    FrameReceived {
        generation: u64,
        frame: RawFrame,
    },
    SocketClosed {
        generation: u64,
        reason: String,
    },
    RetryElapsed,
}

struct Actor {
    config: TransportConfig,
    state: LinkState,
    buffer: CaptureBuffer,
    write: Option<SplitSink<WsStream, Message>>,
    reader: Option<tokio::task::JoinHandle<()>>,
    /// Incremented per connection attempt; signals carrying an older
    /// generation belong to a dead socket and are discarded.
    generation: u64,
    sig_tx: mpsc::Sender<Signal>,
    event_tx: mpsc::Sender<TransportEvent>,
}

async fn run_actor(
    config: TransportConfig,
    mut cmd_rx: mpsc::Receiver<TransportCmd>,
    event_tx: mpsc::Sender<TransportEvent>,
) {
    let (sig_tx, mut sig_rx) = mpsc::channel(64);
    let buffer = CaptureBuffer::new(config.buffer_capacity);

    let mut actor = Actor {
        config,
        state: LinkState::Idle,
        buffer,
        write: None,
        reader: None,
        generation: 0,
        sig_tx,
        event_tx,
    };

    log::info!("Transport actor started for {}", actor.config.url);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                None => {
                    // Every handle dropped: tear down like a deliberate stop
                    actor.apply(LinkEvent::StopRequested).await;
                    break;
                }
                Some(TransportCmd::Start) => actor.apply(LinkEvent::StartRequested).await,
                Some(TransportCmd::Stop) => actor.apply(LinkEvent::StopRequested).await,
                Some(TransportCmd::Send(message)) => actor.handle_send(message).await,
                Some(TransportCmd::DiscardBufferedAudio) => actor.buffer.discard_audio(),
            },
            signal = sig_rx.recv() => {
                if let Some(signal) = signal {
                    actor.handle_signal(signal).await;
                }
            }
        }
    }

    log::info!("Transport actor ended");
}

impl Actor {
    /// Feed an event through the reducer and execute the resulting effects.
    /// Effects may synthesize follow-up events (e.g. a failed flush feeds a
    /// close back in), processed in order.
    async fn apply(&mut self, event: LinkEvent) {
        let mut pending = VecDeque::new();
        pending.push_back(event);

        while let Some(event) = pending.pop_front() {
            let (next, effects) = reduce(self.state, &event);
            if next != self.state {
                log::info!("Link state: {:?} -> {:?}", self.state, next);
                self.state = next;
            }
            for effect in effects {
                if let Some(follow_up) = self.run_effect(effect).await {
                    pending.push_back(follow_up);
                }
            }
        }
    }

    async fn run_effect(&mut self, effect: LinkEffect) -> Option<LinkEvent> {
        match effect {
            LinkEffect::OpenSocket => {
                self.generation += 1;
                self.spawn_connect();
                None
            }
            LinkEffect::FlushBuffered => self.flush_buffered().await,
            LinkEffect::CloseSocket => {
                self.drop_socket(true).await;
                // The reader was torn down with the socket, so synthesize
                // the close the reducer is waiting for.
                Some(LinkEvent::SocketClosed {
                    reason: "client stop".to_string(),
                })
            }
            LinkEffect::ScheduleRetry => {
                let delay = self.config.reconnect_delay;
                let sig = self.sig_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = sig.send(Signal::RetryElapsed).await;
                });
                None
            }
            LinkEffect::NotifyOffline => {
                self.emit(TransportEvent::Notice(
                    "Connection lost. Reconnecting...".to_string(),
                ))
                .await;
                None
            }
        }
    }

    /// Send all buffered media frames in FIFO order. A mid-flush send
    /// failure re-buffers the unsent tail, order preserved, and reports the
    /// socket as closed.
    async fn flush_buffered(&mut self) -> Option<LinkEvent> {
        let count = self.buffer.len();
        if count > 0 {
            log::info!("Flushing {} buffered media frames", count);
        }

        let mut frames = self.buffer.drain_all().into_iter();
        while let Some(frame) = frames.next() {
            if let Err(reason) = self.write_message(&frame.message).await {
                self.buffer.push(frame.message);
                for rest in frames {
                    self.buffer.push(rest.message);
                }
                self.drop_socket(false).await;
                return Some(LinkEvent::SocketClosed { reason });
            }
        }
        None
    }

    async fn handle_send(&mut self, message: Outbound) {
        if self.state == LinkState::Open {
            if let Err(reason) = self.write_message(&message).await {
                log::warn!("Send failed: {}", reason);
                if message.is_media() {
                    self.buffer.push(message);
                }
                self.drop_socket(false).await;
                self.apply(LinkEvent::SocketClosed { reason }).await;
            }
        } else if message.is_media() {
            self.buffer.push(message);
        } else {
            // A control message with no live turn to apply to
            log::debug!("Dropping control frame while link is {:?}", self.state);
        }
    }

    async fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Connected { generation, stream } => {
                if generation != self.generation || self.state != LinkState::Connecting {
                    log::debug!("Discarding stale connection (generation {})", generation);
                    tokio::spawn(async move {
                        let mut stream = stream;
                        let _ = stream.close(None).await;
                    });
                    return;
                }
                let (write, read) = (*stream).split();
                self.write = Some(write);
                self.spawn_reader(read);
                self.apply(LinkEvent::ConnectSucceeded).await;
            }
            Signal::ConnectFailed { generation, reason } => {
                if generation == self.generation {
                    self.apply(LinkEvent::ConnectFailed { reason }).await;
                }
            }
            Signal::FrameReceived { generation, frame } => {
                if generation == self.generation {
                    self.emit(TransportEvent::Frame(frame)).await;
                }
            }
            Signal::SocketClosed { generation, reason } => {
                if generation == self.generation {
                    self.write = None;
                    self.reader = None;
                    self.apply(LinkEvent::SocketClosed { reason }).await;
                }
            }
            Signal::RetryElapsed => self.apply(LinkEvent::RetryElapsed).await,
        }
    }

    fn spawn_connect(&self) {
        let generation = self.generation;
        let url = self.config.url.clone();
        let token = self.config.session_token.clone();
        let sig = self.sig_tx.clone();

        tokio::spawn(async move {
            match open_socket(&url, token.as_deref()).await {
                Ok(stream) => {
                    let _ = sig
                        .send(Signal::Connected {
                            generation,
                            stream: Box::new(stream),
                        })
                        .await;
                }
                Err(reason) => {
                    let _ = sig.send(Signal::ConnectFailed { generation, reason }).await;
                }
            }
        });
    }

    fn spawn_reader(&mut self, mut read: SplitStream<WsStream>) {
        let generation = self.generation;
        let sig = self.sig_tx.clone();

        let task = tokio::spawn(async move {
            while let Some(result) = read.next().await {
                match result {
                    Ok(Message::Text(text)) => {
                        let frame = RawFrame::Text(text);
                        if sig
                            .send(Signal::FrameReceived { generation, frame })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(Message::Binary(bytes)) => {
                        let frame = RawFrame::Binary(bytes);
                        if sig
                            .send(Signal::FrameReceived { generation, frame })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {} // ping/pong
                    Err(e) => {
                        let _ = sig
                            .send(Signal::SocketClosed {
                                generation,
                                reason: e.to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }
            let _ = sig
                .send(Signal::SocketClosed {
                    generation,
                    reason: "closed by server".to_string(),
                })
                .await;
        });

        self.reader = Some(task);
    }

    /// Serialize into the session envelope and write one text frame.
    async fn write_message(&mut self, message: &Outbound) -> Result<(), String> {
        let envelope = Envelope::new(
            message,
            self.config.session_id,
            self.config.session_token.as_deref(),
        );
        let json = serde_json::to_string(&envelope).map_err(|e| e.to_string())?;

        match self.write.as_mut() {
            Some(write) => write
                .send(Message::Text(json))
                .await
                .map_err(|e| e.to_string()),
            None => Err("no open socket".to_string()),
        }
    }

    /// Tear down the active socket. `graceful` sends a close frame first.
    /// Bumps the generation so late signals from the old reader are stale.
    async fn drop_socket(&mut self, graceful: bool) {
        if let Some(mut write) = self.write.take() {
            if graceful {
                let _ = write.close().await;
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.generation += 1;
    }

    async fn emit(&self, event: TransportEvent) {
        if self.event_tx.send(event).await.is_err() {
            log::debug!("Transport event consumer is gone");
        }
    }
}

async fn open_socket(url: &str, token: Option<&str>) -> Result<WsStream, String> {
    let mut request = url.into_client_request().map_err(|e| e.to_string())?;

    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| e.to_string())?;
        request.headers_mut().insert("Authorization", value);
    }

    log::debug!("Connecting to {}", url);
    let (stream, _response) = connect_async_with_config(request, None, false)
        .await
        .map_err(|e| e.to_string())?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_actor() -> (Actor, mpsc::Receiver<TransportEvent>) {
        let (sig_tx, _sig_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(8);
        let actor = Actor {
            config: TransportConfig {
                url: "ws://localhost:9/ws/session".to_string(),
                session_id: Uuid::new_v4(),
                session_token: None,
                reconnect_delay: Duration::from_millis(10),
                buffer_capacity: 4,
            },
            state: LinkState::Idle,
            buffer: CaptureBuffer::new(4),
            write: None,
            reader: None,
            generation: 0,
            sig_tx,
            event_tx,
        };
        (actor, event_rx)
    }

    #[tokio::test]
    async fn media_sent_while_disconnected_is_buffered() {
        let (mut actor, _events) = test_actor();

        actor.handle_send(Outbound::audio_chunk(&[1])).await;
        actor.handle_send(Outbound::snapshot(&[2])).await;

        assert_eq!(actor.buffer.len(), 2);
    }

    #[tokio::test]
    async fn control_sent_while_disconnected_is_dropped() {
        let (mut actor, _events) = test_actor();

        actor.handle_send(Outbound::mode_selected("book")).await;
        actor.handle_send(Outbound::Stop).await;

        assert!(actor.buffer.is_empty());
    }

    #[tokio::test]
    async fn buffered_media_survives_a_failed_reconnect_cycle() {
        let (mut actor, _events) = test_actor();

        actor.handle_send(Outbound::audio_chunk(&[1])).await;
        actor
            .apply(LinkEvent::ConnectFailed {
                reason: "refused".to_string(),
            })
            .await;

        assert_eq!(actor.buffer.len(), 1);
    }

    #[tokio::test]
    async fn deliberate_stop_lands_in_closed() {
        let (mut actor, _events) = test_actor();

        actor.apply(LinkEvent::StartRequested).await;
        assert_eq!(actor.state, LinkState::Connecting);

        actor.apply(LinkEvent::StopRequested).await;
        assert_eq!(actor.state, LinkState::Closed);
    }

    #[tokio::test]
    async fn offline_notice_reaches_the_event_channel() {
        let (mut actor, mut events) = test_actor();
        actor.state = LinkState::Open;

        actor
            .apply(LinkEvent::SocketClosed {
                reason: "peer reset".to_string(),
            })
            .await;

        match events.try_recv() {
            Ok(TransportEvent::Notice(text)) => assert!(text.contains("Connection lost")),
            other => panic!("Expected a notice, got {:?}", other),
        }
        assert_eq!(actor.state, LinkState::Reconnecting);
    }
}
