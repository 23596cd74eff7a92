//! Engine configuration
//!
//! Defaults work against a local backend; a JSON config file under the
//! platform config dir can override any field, and the `LEXI_WS_URL` /
//! `LEXI_SESSION_TOKEN` environment variables override the file. A missing
//! or unparsable file falls back to defaults with a warning, never an
//! error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR_NAME: &str = "lexi-session";
const CONFIG_FILE_NAME: &str = "config.json";

/// Environment override for the WebSocket endpoint.
pub const ENV_WS_URL: &str = "LEXI_WS_URL";
/// Environment override for the session token.
pub const ENV_SESSION_TOKEN: &str = "LEXI_SESSION_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// WebSocket endpoint of the backend session socket.
    pub ws_url: String,

    /// Optional bearer token attached at the handshake and to outbound
    /// envelopes.
    pub session_token: Option<String>,

    /// Fixed delay between reconnect attempts. Retried indefinitely.
    pub reconnect_delay_ms: u64,

    /// Cadence of outbound audio chunks. Valid anywhere in 100-500 ms;
    /// a tunable, not a correctness property.
    pub audio_chunk_ms: u64,

    /// Period of the local fallback highlight timer.
    pub highlight_interval_ms: u64,

    /// Capacity bound of the offline media buffer, in frames.
    pub capture_buffer_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080/ws/session".to_string(),
            session_token: None,
            reconnect_delay_ms: 3000,
            audio_chunk_ms: 250,
            highlight_interval_ms: 1000,
            capture_buffer_frames: 64,
        }
    }
}

impl EngineConfig {
    /// Load from the default config path, then apply environment overrides.
    pub fn load() -> Self {
        let mut config = match config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                log::warn!("Config: could not determine config directory, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    /// Load from a specific file. Missing file or parse failure falls back
    /// to defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<EngineConfig>(&contents) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Config: failed to parse {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                log::warn!("Config: failed to read {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Apply `LEXI_WS_URL` and `LEXI_SESSION_TOKEN` when set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(ENV_WS_URL) {
            self.ws_url = url;
        }
        if let Some(token) = non_empty_env(ENV_SESSION_TOKEN) {
            self.session_token = Some(token);
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
