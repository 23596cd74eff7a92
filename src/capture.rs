//! Capture pipeline: device input to outbound media frames
//!
//! Two independent producers behind one consent gate: a continuous audio
//! stream (opaque chunks at a fixed cadence) and single-shot camera
//! snapshots. The pipeline knows nothing about server state; it hands every
//! chunk to the transport and lets the transport buffer or send it.
//!
//! Device acquisition can fail (permission denied, no device). That is a
//! recoverable condition surfaced to the user; the pipeline stays idle
//! until retried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::transport::{Outbound, TransportHandle};

/// Errors from device acquisition or capture.
#[derive(Debug, Clone)]
pub enum CaptureError {
    /// The user denied access to the device.
    PermissionDenied(String),
    /// No usable device, or the device failed while starting.
    DeviceUnavailable(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::PermissionDenied(detail) => {
                write!(f, "device access denied: {}", detail)
            }
            CaptureError::DeviceUnavailable(detail) => {
                write!(f, "device unavailable: {}", detail)
            }
        }
    }
}

impl std::error::Error for CaptureError {}

/// Handle to a live audio capture, returned by a device.
///
/// The device feeds opaque binary chunks into the channel until `stop()`
/// flips the liveness flag, at which point it must release the device and
/// drop its sender promptly.
#[derive(Debug)]
pub struct AudioCaptureHandle {
    chunks: Option<mpsc::Receiver<Vec<u8>>>,
    live: Arc<AtomicBool>,
}

impl AudioCaptureHandle {
    /// Pair a chunk receiver with a liveness flag the device polls.
    pub fn new(chunks: mpsc::Receiver<Vec<u8>>, live: Arc<AtomicBool>) -> Self {
        Self {
            chunks: Some(chunks),
            live,
        }
    }

    /// Take the chunk receiver for the forwarding task. Returns `None` if
    /// already taken.
    pub fn take_chunks(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.chunks.take()
    }

    /// Ask the device to stop capturing and release itself.
    pub fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// A microphone/camera pair, implemented by the host.
///
/// `arm_audio` may only be called after the consent gate (the engine
/// enforces this); it returns a handle whose channel yields chunks at
/// roughly `chunk_interval` cadence. Chunk boundaries are opaque here.
pub trait CaptureDevice: Send + Sync {
    fn arm_audio(&self, chunk_interval: Duration) -> Result<AudioCaptureHandle, CaptureError>;

    /// Single-shot camera frame.
    fn snapshot(&self) -> Result<Vec<u8>, CaptureError>;
}

struct ActiveCapture {
    handle: AudioCaptureHandle,
    forward: tokio::task::JoinHandle<()>,
}

/// Owns the capture lifecycle and the chunk-forwarding task.
pub struct CapturePipeline {
    device: Arc<dyn CaptureDevice>,
    transport: TransportHandle,
    chunk_interval: Duration,
    active: Option<ActiveCapture>,
}

impl CapturePipeline {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        transport: TransportHandle,
        chunk_interval: Duration,
    ) -> Self {
        Self {
            device,
            transport,
            chunk_interval,
            active: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Acquire the microphone and start forwarding chunks to the transport.
    /// Idempotent while already recording. Audio chunks still buffered from
    /// a previous capture session are discarded first, so stale audio never
    /// bleeds into the new session; buffered snapshots are unaffected.
    pub async fn arm_audio(&mut self) -> Result<(), CaptureError> {
        if self.active.is_some() {
            return Ok(());
        }

        let mut handle = self.device.arm_audio(self.chunk_interval)?;
        let rx = handle.take_chunks().ok_or_else(|| {
            CaptureError::DeviceUnavailable("device returned a spent capture handle".to_string())
        })?;

        self.transport.discard_buffered_audio().await;

        let transport = self.transport.clone();
        let forward = tokio::spawn(async move {
            let mut rx = rx;
            let mut forwarded: u64 = 0;
            while let Some(chunk) = rx.recv().await {
                transport.send(Outbound::audio_chunk(&chunk)).await;
                forwarded += 1;
                if forwarded % 50 == 0 {
                    log::debug!("Capture: forwarded {} audio chunks", forwarded);
                }
            }
            log::debug!("Capture forwarding ended after {} chunks", forwarded);
        });

        log::info!("Audio capture armed ({:?} cadence)", self.chunk_interval);
        self.active = Some(ActiveCapture { handle, forward });
        Ok(())
    }

    /// Release the microphone and stop forwarding immediately. Chunks still
    /// sitting in the device channel belong to the ended session and are
    /// dropped with it.
    pub fn stop_audio(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.stop();
            active.forward.abort();
            log::info!("Audio capture stopped");
        }
    }

    /// Capture one camera frame and send it as a snapshot message.
    pub async fn snapshot(&self) -> Result<(), CaptureError> {
        let bytes = self.device.snapshot()?;
        log::debug!("Snapshot captured ({} bytes)", bytes.len());
        self.transport.send(Outbound::snapshot(&bytes)).await;
        Ok(())
    }
}
