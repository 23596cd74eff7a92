//! Reading-state synchronizer
//!
//! Owns the ordered sequence of displayable word tokens for the active mode
//! and the index of the currently highlighted word. Two things move the
//! highlight: the engine's local fallback timer (round-robin advance, used
//! when no server guidance is available) and authoritative `highlight`
//! events pushed by the server.
//!
//! The sequence is replaced wholesale on every mode change and never mutated
//! in place, so a highlight index can never dangle into a stale sequence.

/// A named content/interaction profile. Each mode maps to its own word
/// sequence; adding a mode means adding a row to [`MODE_PASSAGES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Book,
    Form,
    Study,
    Write,
}

/// Source text per mode. Split into word tokens by [`Mode::units`].
const MODE_PASSAGES: [(Mode, &str); 4] = [
    (
        Mode::Book,
        "Once upon a time a small fox found a quiet path through the tall green forest.",
    ),
    (
        Mode::Form,
        "Full name Date of birth Street address City Postal code Phone number Signature",
    ),
    (
        Mode::Study,
        "Plants use sunlight water and air to make their own food through photosynthesis.",
    ),
    (
        Mode::Write,
        "Describe a place you love and explain what makes it special to you.",
    ),
];

impl Mode {
    /// Wire name of this mode, as carried in `mode` fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Book => "book",
            Mode::Form => "form",
            Mode::Study => "study",
            Mode::Write => "write",
        }
    }

    /// Parse a wire mode name. Returns `None` for names outside the closed
    /// set, which callers treat as a protocol error.
    pub fn parse(name: &str) -> Option<Mode> {
        match name {
            "book" => Some(Mode::Book),
            "form" => Some(Mode::Form),
            "study" => Some(Mode::Study),
            "write" => Some(Mode::Write),
            _ => None,
        }
    }

    /// Build a fresh Reading Unit Sequence for this mode.
    pub fn units(&self) -> Vec<String> {
        let passage = MODE_PASSAGES
            .iter()
            .find(|(mode, _)| mode == self)
            .map(|(_, text)| *text)
            .unwrap_or_default();
        passage.split_whitespace().map(str::to_string).collect()
    }
}

/// Snapshot of the reading state, published to observers after every change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadingSnapshot {
    pub mode: Option<Mode>,
    pub units: Vec<String>,
    pub highlight: Option<usize>,
}

/// The single owner of the Reading Unit Sequence and Highlight Index.
///
/// Invariant: `highlight` is `Some(i)` with `i < units.len()` whenever the
/// sequence is non-empty, and `None` when it is empty.
#[derive(Debug, Default)]
pub struct ReadingState {
    mode: Option<Mode>,
    units: Vec<String>,
    highlight: Option<usize>,
}

impl ReadingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the sequence wholesale for `mode` and reset the highlight
    /// to the first unit. Last write wins when local and server-initiated
    /// changes race.
    pub fn set_mode(&mut self, mode: Mode) {
        let units = mode.units();
        log::info!("Reading mode -> {} ({} units)", mode.as_str(), units.len());
        self.highlight = if units.is_empty() { None } else { Some(0) };
        self.units = units;
        self.mode = Some(mode);
    }

    /// Local fallback timer tick: advance the highlight by one, wrapping
    /// modulo the sequence length. No-op while the sequence is empty.
    pub fn tick(&mut self) {
        if let Some(index) = self.highlight {
            self.highlight = Some((index + 1) % self.units.len());
        }
    }

    /// Apply a server-pushed highlight override. Returns `true` if the
    /// index was applied; an out-of-range index is a protocol error and is
    /// ignored so the range invariant holds.
    pub fn apply_server_highlight(&mut self, index: usize) -> bool {
        if index < self.units.len() {
            self.highlight = Some(index);
            true
        } else {
            log::warn!(
                "Ignoring server highlight {} for {}-unit sequence",
                index,
                self.units.len()
            );
            false
        }
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn highlight(&self) -> Option<usize> {
        self.highlight
    }

    pub fn snapshot(&self) -> ReadingSnapshot {
        ReadingSnapshot {
            mode: self.mode,
            units: self.units.clone(),
            highlight: self.highlight,
        }
    }
}
