//! Application settings (`settings.toml`)

use crate::domain::config::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument, warn};

/// Application-level configuration
///
/// Every field has a default, so a partial or missing file is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listen address of the web UI
    pub web_addr: String,

    /// Serve the web UI at all
    pub web_enabled: bool,

    /// Quiet window before bindings are written to disk
    pub save_debounce_ms: u64,

    /// Interval of the structural audio-source poll
    pub structural_poll_secs: u64,

    /// Upper bound for a single audio server call
    pub audio_timeout_ms: u64,

    /// Capacity of the MIDI event queue
    pub midi_event_buffer: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            web_addr: "127.0.0.1:6080".to_string(),
            web_enabled: true,
            save_debounce_ms: 2000,
            structural_poll_secs: 2,
            audio_timeout_ms: 1000,
            midi_event_buffer: 256,
        }
    }
}

impl AppConfig {
    pub const FILE_NAME: &'static str = "settings.toml";

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn structural_poll_interval(&self) -> Duration {
        Duration::from_secs(self.structural_poll_secs.max(1))
    }

    pub fn audio_timeout(&self) -> Duration {
        Duration::from_millis(self.audio_timeout_ms.max(1))
    }

    /// Parse settings from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load settings, falling back to defaults
    ///
    /// A missing file is not created. A malformed one is reported and ignored.
    #[instrument(skip(path))]
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read settings, using defaults");
                return Self::default();
            }
        };

        match Self::from_toml(&contents) {
            Ok(settings) => {
                info!(path = %path.display(), "Settings loaded");
                settings
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid settings, using defaults");
                Self::default()
            }
        }
    }
}
