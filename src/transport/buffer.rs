//! Bounded FIFO buffer for media frames awaiting transmission
//!
//! Used only while the link is not Open, so capture never blocks on a
//! network stall. Drained in arrival order on reconnect. When the bound is
//! exceeded the oldest frames are evicted with a warning; media that is far
//! behind real time has no value to the backend.

use std::collections::VecDeque;

use super::protocol::Outbound;

/// A buffered media message with its arrival order.
#[derive(Debug, Clone)]
pub struct BufferedFrame {
    pub message: Outbound,
    /// Monotonically increasing arrival sequence, for ordering checks.
    pub sequence: u64,
}

/// FIFO of pending media frames with automatic oldest-first eviction.
///
/// Not internally synchronized; owned and mutated only by the transport
/// actor.
#[derive(Debug)]
pub struct CaptureBuffer {
    frames: VecDeque<BufferedFrame>,
    max_frames: usize,
    next_sequence: u64,
    dropped: u64,
}

impl CaptureBuffer {
    /// Create a buffer holding at most `max_frames` pending frames.
    pub fn new(max_frames: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(max_frames.min(256)),
            max_frames,
            next_sequence: 0,
            dropped: 0,
        }
    }

    /// Buffer a media message, evicting the oldest frame when full.
    /// Returns the sequence number assigned to this frame.
    pub fn push(&mut self, message: Outbound) -> u64 {
        if self.frames.len() >= self.max_frames {
            self.frames.pop_front();
            self.dropped += 1;
            log::warn!(
                "Capture buffer full ({} frames), dropped oldest ({} dropped total)",
                self.max_frames,
                self.dropped
            );
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.frames.push_back(BufferedFrame { message, sequence });
        sequence
    }

    /// Remove and return all pending frames in arrival order.
    pub fn drain_all(&mut self) -> Vec<BufferedFrame> {
        self.frames.drain(..).collect()
    }

    /// Discard pending audio chunks, e.g. when a fresh capture session
    /// starts before the old buffer drained. Snapshots and uploads are not
    /// session-scoped and stay queued.
    pub fn discard_audio(&mut self) {
        let before = self.frames.len();
        self.frames
            .retain(|frame| !matches!(frame.message, Outbound::AudioChunk { .. }));
        let removed = before - self.frames.len();
        if removed > 0 {
            log::debug!("Discarded {} stale buffered audio chunks", removed);
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total frames evicted due to the capacity bound.
    pub fn dropped_total(&self) -> u64 {
        self.dropped
    }
}
