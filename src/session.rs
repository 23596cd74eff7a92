//! Session identity
//!
//! A `Session` is created the first time the user grants data-collection
//! consent and lives for the rest of the page/process lifetime. Its id is
//! generated once and stays stable across reconnects, so the backend can
//! correlate frames from before and after a network drop.

use uuid::Uuid;

/// Logical identity of one client's interaction with the backend.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session identifier, stable across reconnects.
    pub id: Uuid,
}

impl Session {
    /// Create a new session. Only called after the user has granted consent.
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        log::info!("Session created: {}", id);
        Self { id }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
