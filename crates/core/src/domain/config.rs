//! Bindings file management
//!
//! This module provides:
//! - The on-disk YAML format (`device` + `controls.sliders/knobs`)
//! - Detection and conversion of the older flat rule-list format
//! - `ConfigManager`, which locates, loads, backs up and atomically saves
//!   the file

use crate::domain::control::{
    ControlBinding, ControlId, ControlKind, ControlValue, Configuration, DeviceIdentity,
};
use crate::domain::rules::DeviceLayout;
use crate::domain::target::{AudioTargetRef, TargetCategory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Unrecognized configuration format")]
    UnrecognizedFormat,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root of the YAML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls: Option<ControlsEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlsEntry {
    #[serde(default)]
    pub sliders: BTreeMap<String, BindingEntry>,
    #[serde(default)]
    pub knobs: BTreeMap<String, BindingEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingEntry {
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_value")]
    pub value: i64,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

fn default_value() -> i64 {
    ControlValue::DEFAULT.get() as i64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Kept as a string so one bad entry does not reject the whole file
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(rename = "binaryName", default, skip_serializing_if = "Option::is_none")]
    pub binary_name: Option<String>,
}

impl From<&AudioTargetRef> for SourceEntry {
    fn from(target: &AudioTargetRef) -> Self {
        Self {
            kind: target.category.as_str().to_string(),
            name: target.name.clone(),
            binary_name: target.disambiguator().map(str::to_string),
        }
    }
}

impl SourceEntry {
    fn to_ref(&self) -> Option<AudioTargetRef> {
        let category: TargetCategory = self.kind.parse().ok()?;
        let target = AudioTargetRef::new(category, self.name.clone());
        Some(match &self.binary_name {
            Some(binary) => target.with_disambiguator(binary.clone()),
            None => target,
        })
    }
}

impl From<&Configuration> for ConfigFile {
    fn from(config: &Configuration) -> Self {
        let entries = |kind: ControlKind| {
            config
                .bindings_of(kind)
                .map(|b| {
                    let entry = BindingEntry {
                        path: b.path(),
                        value: b.value.get() as i64,
                        sources: b.targets().iter().map(SourceEntry::from).collect(),
                    };
                    (b.id.to_string(), entry)
                })
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            device: Some(config.device.clone()),
            controls: Some(ControlsEntry {
                sliders: entries(ControlKind::Slider),
                knobs: entries(ControlKind::Knob),
            }),
        }
    }
}

impl ConfigFile {
    /// Whether the document looks like the current format
    fn is_current(&self) -> bool {
        self.device.as_ref().is_some_and(|d| !d.name.is_empty()) || self.controls.is_some()
    }

    /// Build a full configuration; missing pieces come from the scaffold
    pub fn into_configuration(self) -> Configuration {
        let mut config = Configuration::empty(self.device.unwrap_or_default());
        let controls = self.controls.unwrap_or_default();

        for (kind, entries) in [
            (ControlKind::Slider, controls.sliders),
            (ControlKind::Knob, controls.knobs),
        ] {
            for (key, entry) in entries {
                let id = match key.parse::<ControlId>() {
                    Ok(id) if id.kind() == kind => id,
                    _ => {
                        warn!(key = %key, "Skipping unknown control in config");
                        continue;
                    }
                };

                let mut binding =
                    ControlBinding::new(id).with_value(ControlValue::new(entry.value));
                for source in &entry.sources {
                    match source.to_ref() {
                        Some(target) => {
                            binding.add_target(target);
                        }
                        None => warn!(
                            control = %id,
                            kind = %source.kind,
                            name = %source.name,
                            "Skipping source with unknown type"
                        ),
                    }
                }
                config.insert(binding);
            }
        }

        config.ensure_scaffold();
        config
    }
}

/// The older flat rule-list format
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyFile {
    #[serde(default)]
    midi_devices: Vec<LegacyDevice>,
    #[serde(default)]
    rules: Vec<LegacyRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyDevice {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    midi_in_name: String,
    #[serde(default)]
    midi_out_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRule {
    #[serde(default)]
    midi_message: LegacyMessage,
    #[serde(default)]
    actions: Vec<LegacyAction>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyMessage {
    #[serde(default)]
    device_control_path: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    channel: u8,
    #[serde(default)]
    controller: u8,
}

#[derive(Debug, Deserialize)]
struct LegacyAction {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    target: serde_yml::Value,
}

const LEGACY_DEVICE_TYPE: &str = "KorgNanoKontrol2";

impl LegacyFile {
    fn is_legacy(&self) -> bool {
        !self.midi_devices.is_empty() || !self.rules.is_empty()
    }

    fn into_configuration(self) -> Configuration {
        let mut config = Configuration::default_scaffold();
        let layout = DeviceLayout::default();

        if let Some(device) = self.midi_devices.first() {
            if device.kind == LEGACY_DEVICE_TYPE {
                config.device = DeviceIdentity {
                    name: device.name.clone(),
                    in_port: device.midi_in_name.clone(),
                    out_port: device.midi_out_name.clone(),
                };
            }
        }

        for rule in self.rules {
            let message = &rule.midi_message;
            let id = if message.device_control_path.is_empty() {
                if message.kind != "ControlChange" {
                    continue;
                }
                match layout.control_for(message.channel, message.controller) {
                    Some(id) => id,
                    None => continue,
                }
            } else {
                match ControlId::from_path(&message.device_control_path) {
                    Ok(id) => id,
                    Err(_) => {
                        debug!(path = %message.device_control_path, "Ignoring legacy rule");
                        continue;
                    }
                }
            };

            let Some(binding) = config.binding_mut(id) else {
                continue;
            };
            for action in &rule.actions {
                if action.kind != "SetVolume" {
                    continue;
                }
                let kind = action.target.get("type").and_then(|v| v.as_str());
                let name = action.target.get("name").and_then(|v| v.as_str());
                let category = kind.and_then(|k| k.parse::<TargetCategory>().ok());
                if let (Some(category), Some(name)) = (category, name) {
                    binding.add_target(AudioTargetRef::new(category, name));
                }
            }
        }

        config.ensure_scaffold();
        config
    }
}

/// A successfully parsed bindings file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedConfig {
    Current(Configuration),
    Legacy(Configuration),
}

/// Parse either file format
pub fn parse(contents: &str) -> Result<ParsedConfig> {
    if let Ok(file) = serde_yml::from_str::<ConfigFile>(contents) {
        if file.is_current() {
            return Ok(ParsedConfig::Current(file.into_configuration()));
        }
    }

    let legacy: LegacyFile = serde_yml::from_str(contents)?;
    if legacy.is_legacy() {
        return Ok(ParsedConfig::Legacy(legacy.into_configuration()));
    }

    Err(ConfigError::UnrecognizedFormat)
}

/// Serialize in the current format
pub fn to_yaml(config: &Configuration) -> Result<String> {
    Ok(serde_yml::to_string(&ConfigFile::from(config))?)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// How the configuration returned by [`ConfigManager::load`] came about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    /// Read from an existing file in the current format
    Loaded,
    /// Converted from the legacy format; rewritten once the original is backed up
    Converted,
    /// No file existed; the scaffold was written
    Created,
    /// The file could not be read or parsed; the scaffold is used in memory
    Fallback,
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub config: Configuration,
    pub path: PathBuf,
    pub origin: LoadOrigin,
}

/// Something that can persist the bindings
#[async_trait]
pub trait ConfigPersistence: Send + Sync {
    async fn save(&self, config: &Configuration) -> Result<()>;
}

/// Manages the bindings file at `~/.config/faderlink/config.yaml`
///
/// Store-driven saves are held back while the file on disk is one that
/// could not be parsed or backed up; only a successful load releases them.
pub struct ConfigManager {
    config_path: PathBuf,
    writes_held: AtomicBool,
}

impl ConfigManager {
    pub const FILE_NAME: &'static str = "config.yaml";

    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            writes_held: AtomicBool::new(false),
        }
    }

    /// Whether [`ConfigPersistence::save`] currently leaves the file alone
    pub fn writes_held(&self) -> bool {
        self.writes_held.load(Ordering::SeqCst)
    }

    fn hold_writes(&self, held: bool) {
        self.writes_held.store(held, Ordering::SeqCst);
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/faderlink` on Linux
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("faderlink"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    /// Pick the file to use
    ///
    /// An explicit path always wins. Otherwise `./config.yaml` is used when
    /// present, falling back to the user config directory.
    pub fn discover(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }

        let local = PathBuf::from(Self::FILE_NAME);
        if local.exists() {
            return Ok(Self::new(local));
        }

        Ok(Self::new(Self::default_config_dir()?.join(Self::FILE_NAME)))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    /// Load the bindings, never failing
    ///
    /// A missing file is created from the scaffold. A legacy file is copied
    /// to `.legacy`, then replaced by the converted form. An unreadable file
    /// is copied to `.corrupt` and left untouched while the scaffold is used,
    /// and later store saves are held back so it is never overwritten.
    #[instrument(skip(self))]
    pub async fn load(&self) -> LoadOutcome {
        let path = self.config_path.clone();
        self.hold_writes(false);

        if !path.exists() {
            info!(path = %path.display(), "Config file not found, creating default");

            let config = Configuration::default_scaffold();
            if let Err(e) = self.save(&config).await {
                error!(path = %path.display(), error = %e, "Failed to save default config");
            }
            return LoadOutcome {
                config,
                path,
                origin: LoadOrigin::Created,
            };
        }

        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read config, using default");
                self.hold_writes(true);
                return LoadOutcome {
                    config: Configuration::default_scaffold(),
                    path,
                    origin: LoadOrigin::Fallback,
                };
            }
        };

        match parse(&contents) {
            Ok(ParsedConfig::Current(config)) => {
                info!(path = %path.display(), "Configuration loaded successfully");
                LoadOutcome {
                    config,
                    path,
                    origin: LoadOrigin::Loaded,
                }
            }
            Ok(ParsedConfig::Legacy(config)) => {
                info!(path = %path.display(), "Converting legacy configuration");

                // The original stays in place until the converted file replaces it
                let backup = with_suffix(&path, ".legacy");
                match fs::copy(&path, &backup).await {
                    Ok(_) => {
                        if let Err(e) = self.save(&config).await {
                            error!(path = %path.display(), error = %e, "Failed to write converted config");
                        }
                    }
                    Err(e) => {
                        error!(
                            path = %backup.display(),
                            error = %e,
                            "Failed to back up legacy config, leaving it in place"
                        );
                        self.hold_writes(true);
                    }
                }

                LoadOutcome {
                    config,
                    path,
                    origin: LoadOrigin::Converted,
                }
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to parse config, using default");

                let backup = with_suffix(&path, ".corrupt");
                if let Err(copy_err) = fs::copy(&path, &backup).await {
                    error!(
                        path = %backup.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }
                self.hold_writes(true);

                LoadOutcome {
                    config: Configuration::default_scaffold(),
                    path,
                    origin: LoadOrigin::Fallback,
                }
            }
        }
    }

    /// Save through a temp file and rename so readers never see a torn file
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &Configuration) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let yaml = to_yaml(config)?;
        let tmp = with_suffix(&self.config_path, ".tmp");
        fs::write(&tmp, yaml).await?;
        fs::rename(&tmp, &self.config_path).await?;

        debug!(path = %self.config_path.display(), "Configuration saved");
        Ok(())
    }
}

#[async_trait]
impl ConfigPersistence for ConfigManager {
    async fn save(&self, config: &Configuration) -> Result<()> {
        if self.writes_held() {
            warn!(
                path = %self.config_path.display(),
                "Config file could not be loaded, changes are kept in memory only"
            );
            return Ok(());
        }
        ConfigManager::save(self, config).await
    }
}
