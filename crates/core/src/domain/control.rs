//! Physical controls and their bindings
//!
//! The surface has a fixed layout: eight sliders and eight knobs, grouped in
//! eight strips ("Group1" .. "Group8"). Each control carries its last known
//! position (0-100) and an ordered list of audio targets it drives.

use crate::domain::target::{AudioTargetRef, TargetCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::trace;

/// Number of controls of each kind on the surface
pub const CONTROLS_PER_KIND: u8 = 8;

/// Errors raised when a control cannot be identified
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("Unknown control kind: {0}")]
    UnknownKind(String),

    #[error("Control index out of range: {0} (must be 1-8)")]
    InvalidIndex(u8),

    #[error("Invalid control id: {0}")]
    InvalidId(String),

    #[error("Invalid control path: {0}")]
    InvalidPath(String),
}

pub type Result<T> = std::result::Result<T, ControlError>;

/// Kind of physical control
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Slider,
    Knob,
}

impl ControlKind {
    pub const ALL: [ControlKind; 2] = [ControlKind::Slider, ControlKind::Knob];

    /// Lowercase name used in control ids and the UI protocol
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlKind::Slider => "slider",
            ControlKind::Knob => "knob",
        }
    }

    /// Capitalized name used in control paths
    pub fn label(&self) -> &'static str {
        match self {
            ControlKind::Slider => "Slider",
            ControlKind::Knob => "Knob",
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlKind {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "slider" => Ok(ControlKind::Slider),
            "knob" => Ok(ControlKind::Knob),
            _ => Err(ControlError::UnknownKind(s.to_string())),
        }
    }
}

/// Stable identifier of one physical control, e.g. `slider3`
///
/// Ordering is sliders 1..8 then knobs 1..8, which is the order every
/// derived structure (rules, UI maps, saved files) follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControlId {
    kind: ControlKind,
    index: u8,
}

impl ControlId {
    pub fn new(kind: ControlKind, index: u8) -> Result<Self> {
        if index == 0 || index > CONTROLS_PER_KIND {
            return Err(ControlError::InvalidIndex(index));
        }
        Ok(Self { kind, index })
    }

    pub fn slider(index: u8) -> Result<Self> {
        Self::new(ControlKind::Slider, index)
    }

    pub fn knob(index: u8) -> Result<Self> {
        Self::new(ControlKind::Knob, index)
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    /// 1-based index within its kind
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Display path, e.g. `Group3/Slider`
    pub fn path(&self) -> String {
        format!("Group{}/{}", self.index, self.kind.label())
    }

    /// Parse a display path such as `Group3/Slider`
    pub fn from_path(path: &str) -> Result<Self> {
        let invalid = || ControlError::InvalidPath(path.to_string());

        let (group, kind) = path.split_once('/').ok_or_else(invalid)?;
        let index: u8 = group
            .strip_prefix("Group")
            .and_then(|n| n.parse().ok())
            .ok_or_else(invalid)?;
        let kind = match kind {
            "Slider" => ControlKind::Slider,
            "Knob" => ControlKind::Knob,
            _ => return Err(invalid()),
        };

        Self::new(kind, index).map_err(|_| invalid())
    }

    /// Every control of the surface, in canonical order
    pub fn all() -> impl Iterator<Item = ControlId> {
        ControlKind::ALL.into_iter().flat_map(|kind| {
            (1..=CONTROLS_PER_KIND).map(move |index| ControlId { kind, index })
        })
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.as_str(), self.index)
    }
}

impl FromStr for ControlId {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ControlError::InvalidId(s.to_string());

        let split = s.find(|c: char| c.is_ascii_digit()).ok_or_else(invalid)?;
        let (kind, index) = s.split_at(split);
        let kind: ControlKind = kind.parse().map_err(|_| invalid())?;
        let index: u8 = index.parse().map_err(|_| invalid())?;

        Self::new(kind, index).map_err(|_| invalid())
    }
}

/// Position of a control as a percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ControlValue(u8);

impl ControlValue {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 100;
    /// Position written into a freshly created scaffold
    pub const DEFAULT: ControlValue = ControlValue(50);

    /// Build from any integer, clamping into 0..=100
    pub fn new(value: i64) -> Self {
        Self(value.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    /// Convert a raw 7-bit MIDI value (0..=127) into a percentage
    pub fn from_midi(raw: u8) -> Self {
        let raw = raw.min(127) as f32;
        Self::new((raw / 127.0 * 100.0).round() as i64)
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Volume fraction in 0.0..=1.0
    pub fn as_fraction(&self) -> f32 {
        self.0 as f32 / Self::MAX as f32
    }
}

impl Default for ControlValue {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// MIDI device the bindings were made for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub in_port: String,
    #[serde(default)]
    pub out_port: String,
}

impl DeviceIdentity {
    pub const DEFAULT_NAME: &'static str = "KORG nanoKONTROL2";
    pub const DEFAULT_PORT: &'static str = "nanoKONTROL2 nanoKONTROL2 _ CTR";

    /// Fill blank fields with the nanoKONTROL2 defaults
    pub fn fill_defaults(&mut self) {
        if self.name.is_empty() {
            self.name = Self::DEFAULT_NAME.to_string();
        }
        if self.in_port.is_empty() {
            self.in_port = Self::DEFAULT_PORT.to_string();
        }
        if self.out_port.is_empty() {
            self.out_port = Self::DEFAULT_PORT.to_string();
        }
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            in_port: Self::DEFAULT_PORT.to_string(),
            out_port: Self::DEFAULT_PORT.to_string(),
        }
    }
}

/// One physical control with its position and assigned targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBinding {
    pub id: ControlId,
    pub value: ControlValue,
    targets: Vec<AudioTargetRef>,
}

impl ControlBinding {
    pub fn new(id: ControlId) -> Self {
        Self {
            id,
            value: ControlValue::DEFAULT,
            targets: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: ControlValue) -> Self {
        self.value = value;
        self
    }

    pub fn path(&self) -> String {
        self.id.path()
    }

    /// Assigned targets in insertion order
    pub fn targets(&self) -> &[AudioTargetRef] {
        &self.targets
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn contains(&self, target: &AudioTargetRef) -> bool {
        self.targets.iter().any(|t| t.same_assignment(target))
    }

    /// Append a target unless an equal one is already present
    pub fn add_target(&mut self, target: AudioTargetRef) -> bool {
        if self.contains(&target) {
            return false;
        }
        trace!(control = %self.id, target = %target, "Target added");
        self.targets.push(target);
        true
    }

    /// Remove every target matching the given identity
    ///
    /// Without a disambiguator the match is on category and name only.
    pub fn remove_matching(
        &mut self,
        category: TargetCategory,
        name: &str,
        disambiguator: Option<&str>,
    ) -> Vec<AudioTargetRef> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.targets)
            .into_iter()
            .partition(|t| t.matches_identity(category, name, disambiguator));
        self.targets = kept;
        removed
    }

    /// Remove exactly this target, returning whether it was present
    pub fn remove_exact(&mut self, target: &AudioTargetRef) -> bool {
        let before = self.targets.len();
        self.targets.retain(|t| !t.same_assignment(target));
        self.targets.len() != before
    }
}

/// Root aggregate: device identity plus one binding per control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub device: DeviceIdentity,
    bindings: BTreeMap<ControlId, ControlBinding>,
}

impl Configuration {
    /// All sixteen controls present, unassigned, at the default position
    pub fn default_scaffold() -> Self {
        Self {
            device: DeviceIdentity::default(),
            bindings: ControlId::all()
                .map(|id| (id, ControlBinding::new(id)))
                .collect(),
        }
    }

    /// Configuration with no bindings at all; call `ensure_scaffold` before use
    pub fn empty(device: DeviceIdentity) -> Self {
        Self {
            device,
            bindings: BTreeMap::new(),
        }
    }

    /// Insert any missing controls and device fields; returns how many
    /// bindings were added
    pub fn ensure_scaffold(&mut self) -> usize {
        self.device.fill_defaults();
        let mut added = 0;
        for id in ControlId::all() {
            self.bindings.entry(id).or_insert_with(|| {
                added += 1;
                ControlBinding::new(id)
            });
        }
        added
    }

    pub fn binding(&self, id: ControlId) -> Option<&ControlBinding> {
        self.bindings.get(&id)
    }

    pub fn binding_mut(&mut self, id: ControlId) -> Option<&mut ControlBinding> {
        self.bindings.get_mut(&id)
    }

    /// Binding for `id`, created empty if missing
    pub fn binding_or_insert(&mut self, id: ControlId) -> &mut ControlBinding {
        self.bindings
            .entry(id)
            .or_insert_with(|| ControlBinding::new(id))
    }

    /// Insert or replace a binding
    pub fn insert(&mut self, binding: ControlBinding) {
        self.bindings.insert(binding.id, binding);
    }

    /// Bindings in canonical order
    pub fn bindings(&self) -> impl Iterator<Item = &ControlBinding> {
        self.bindings.values()
    }

    pub fn bindings_of(&self, kind: ControlKind) -> impl Iterator<Item = &ControlBinding> {
        self.bindings.values().filter(move |b| b.id.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::default_scaffold()
    }
}
