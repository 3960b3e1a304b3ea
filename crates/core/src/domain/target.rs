//! Audio targets: symbolic references and live server objects
//!
//! An [`AudioTargetRef`] is what the user stores in a binding. A
//! [`LiveAudioObject`] is what the audio server reports right now. The
//! [`AudioServer`] trait is the only seam between the core and the real
//! sound system.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Volume reported for objects whose real level could not be read
pub const UNKNOWN_VOLUME: u8 = 75;

/// Audio server errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio server unavailable: {0}")]
    Unavailable(String),

    #[error("Audio server command failed: {0}")]
    Command(String),

    #[error("Failed to parse audio server output: {0}")]
    Parse(String),

    #[error("Audio server call timed out: {0}")]
    Timeout(String),

    #[error("Audio object not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// The four kinds of objects a control can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TargetCategory {
    OutputDevice,
    InputDevice,
    PlaybackStream,
    RecordStream,
}

impl TargetCategory {
    pub const ALL: [TargetCategory; 4] = [
        TargetCategory::OutputDevice,
        TargetCategory::InputDevice,
        TargetCategory::PlaybackStream,
        TargetCategory::RecordStream,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetCategory::OutputDevice => "OutputDevice",
            TargetCategory::InputDevice => "InputDevice",
            TargetCategory::PlaybackStream => "PlaybackStream",
            TargetCategory::RecordStream => "RecordStream",
        }
    }

    pub fn is_device(&self) -> bool {
        matches!(self, TargetCategory::OutputDevice | TargetCategory::InputDevice)
    }

    pub fn is_stream(&self) -> bool {
        !self.is_device()
    }

    /// Lenient parse used for UI input
    ///
    /// Accepts the canonical names in any case as well as the short forms
    /// `output`, `input`, `playback` and `record`.
    pub fn parse_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "outputdevice" | "output" => Some(TargetCategory::OutputDevice),
            "inputdevice" | "input" => Some(TargetCategory::InputDevice),
            "playbackstream" | "playback" => Some(TargetCategory::PlaybackStream),
            "recordstream" | "record" => Some(TargetCategory::RecordStream),
            _ => None,
        }
    }
}

impl fmt::Display for TargetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetCategory {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self> {
        TargetCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| AudioError::Parse(format!("unknown target type '{}'", s)))
    }
}

/// Symbolic reference to an audio endpoint or stream
///
/// `disambiguator` is the owning process binary. It is absent on legacy
/// references, which then match any live stream with the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioTargetRef {
    pub category: TargetCategory,
    pub name: String,
    disambiguator: Option<String>,
}

impl AudioTargetRef {
    pub fn new(category: TargetCategory, name: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
            disambiguator: None,
        }
    }

    /// Attach a disambiguator; an empty string leaves the ref legacy
    pub fn with_disambiguator(mut self, disambiguator: impl Into<String>) -> Self {
        let disambiguator = disambiguator.into();
        self.disambiguator = (!disambiguator.is_empty()).then_some(disambiguator);
        self
    }

    pub fn disambiguator(&self) -> Option<&str> {
        self.disambiguator.as_deref()
    }

    pub fn is_legacy(&self) -> bool {
        self.disambiguator.is_none()
    }

    /// Assignment equality: category, name and disambiguator all match
    pub fn same_assignment(&self, other: &AudioTargetRef) -> bool {
        self == other
    }

    /// Identity match used by unassign
    ///
    /// `None` matches on category and name alone.
    pub fn matches_identity(
        &self,
        category: TargetCategory,
        name: &str,
        disambiguator: Option<&str>,
    ) -> bool {
        if self.category != category || self.name != name {
            return false;
        }
        match disambiguator.filter(|d| !d.is_empty()) {
            Some(d) => self.disambiguator.as_deref() == Some(d),
            None => true,
        }
    }

    /// Id shown to the UI when no live object backs this ref
    pub fn virtual_id(&self) -> String {
        format!("{}:{}", self.category, self.name)
    }
}

impl fmt::Display for AudioTargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.disambiguator {
            Some(d) => write!(f, "{} \"{}\" ({})", self.category, self.name, d),
            None => write!(f, "{} \"{}\"", self.category, self.name),
        }
    }
}

/// One endpoint or stream as currently reported by the audio server
///
/// Rebuilt on every enumeration and never persisted. `stable_id` is only
/// unique among objects that are live right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveAudioObject {
    pub category: TargetCategory,
    pub name: String,
    pub disambiguator: Option<String>,
    pub stable_id: String,
    /// Current volume in percent, or [`UNKNOWN_VOLUME`]
    pub volume: u8,
    /// Backend handle used for writes (sink name, stream index, ...)
    pub handle: String,
    pub properties: BTreeMap<String, String>,
}

impl LiveAudioObject {
    pub fn new(
        category: TargetCategory,
        name: impl Into<String>,
        stable_id: impl Into<String>,
        handle: impl Into<String>,
    ) -> Self {
        Self {
            category,
            name: name.into(),
            disambiguator: None,
            stable_id: stable_id.into(),
            volume: UNKNOWN_VOLUME,
            handle: handle.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_disambiguator(mut self, disambiguator: impl Into<String>) -> Self {
        let disambiguator = disambiguator.into();
        self.disambiguator = (!disambiguator.is_empty()).then_some(disambiguator);
        self
    }

    pub fn with_volume(mut self, volume: u8) -> Self {
        self.volume = volume.min(100);
        self
    }

    /// The strongest ref that resolves to this object
    pub fn to_ref(&self) -> AudioTargetRef {
        let target = AudioTargetRef::new(self.category, self.name.clone());
        match &self.disambiguator {
            Some(d) if self.category.is_stream() => target.with_disambiguator(d.clone()),
            _ => target,
        }
    }

    /// Name with the binary in parentheses, as shown in listings
    pub fn display_name(&self) -> String {
        match &self.disambiguator {
            Some(d) => format!("{} ({})", self.name, d),
            None => self.name.clone(),
        }
    }
}

/// Capabilities the core needs from the sound system
#[async_trait]
pub trait AudioServer: Send + Sync {
    /// Every live object of one category, in server order
    async fn list(&self, category: TargetCategory) -> Result<Vec<LiveAudioObject>>;

    /// Stable id of the current default sink or source
    async fn default_device(&self, category: TargetCategory) -> Result<Option<String>>;

    /// Set volume as a fraction in 0.0..=1.0
    async fn set_volume(&self, object: &LiveAudioObject, fraction: f32) -> Result<()>;

    async fn set_default_output(&self, object: &LiveAudioObject) -> Result<()>;
}
