//! `pactl` backed audio server
//!
//! Objects are listed with `pactl --format=json list <kind>` and written
//! with the `set-*-volume` commands. Stream lifecycle changes come from a
//! long-running `pactl subscribe` child.

use async_trait::async_trait;
use faderlink_core::domain::target::{
    AudioError, AudioServer, LiveAudioObject, Result, TargetCategory, UNKNOWN_VOLUME,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const PROP_APP_NAME: &str = "application.name";
const PROP_MEDIA_NAME: &str = "media.name";
const PROP_BINARY: &str = "application.process.binary";
const PROP_OBJECT_ID: &str = "object.id";
const PROP_RESTORE_ID: &str = "module-stream-restore.id";

/// `pactl` object kinds for each category
fn list_kind(category: TargetCategory) -> &'static str {
    match category {
        TargetCategory::OutputDevice => "sinks",
        TargetCategory::InputDevice => "sources",
        TargetCategory::PlaybackStream => "sink-inputs",
        TargetCategory::RecordStream => "source-outputs",
    }
}

fn volume_command(category: TargetCategory) -> &'static str {
    match category {
        TargetCategory::OutputDevice => "set-sink-volume",
        TargetCategory::InputDevice => "set-source-volume",
        TargetCategory::PlaybackStream => "set-sink-input-volume",
        TargetCategory::RecordStream => "set-source-output-volume",
    }
}

#[derive(Debug, Deserialize)]
struct PactlObject {
    index: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    volume: BTreeMap<String, ChannelVolume>,
    #[serde(default)]
    properties: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChannelVolume {
    #[serde(default)]
    value_percent: String,
}

impl PactlObject {
    fn average_volume(&self) -> u8 {
        let levels: Vec<u32> = self
            .volume
            .values()
            .filter_map(|v| v.value_percent.trim().trim_end_matches('%').parse().ok())
            .collect();
        if levels.is_empty() {
            return UNKNOWN_VOLUME;
        }
        let average = levels.iter().sum::<u32>() / levels.len() as u32;
        average.min(100) as u8
    }

    fn string_properties(&self) -> BTreeMap<String, String> {
        self.properties
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }

    fn into_live(self, category: TargetCategory) -> LiveAudioObject {
        let properties = self.string_properties();
        let volume = self.average_volume();
        let prop = |key: &str| properties.get(key).cloned().unwrap_or_default();

        let object = if category.is_device() {
            let id = self.name.clone().unwrap_or_else(|| self.index.to_string());
            let display = self
                .description
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| id.clone());
            LiveAudioObject::new(category, display, id.clone(), id)
        } else {
            let mut display = prop(PROP_APP_NAME);
            if display.is_empty() {
                display = prop(PROP_MEDIA_NAME);
            }

            let restore_id = prop(PROP_RESTORE_ID);
            let object_id = prop(PROP_OBJECT_ID);
            let stable_id = match (restore_id.is_empty(), object_id.is_empty()) {
                (false, false) => format!("{}:{}", restore_id, object_id),
                (false, true) => restore_id,
                (true, false) => object_id,
                (true, true) => self.index.to_string(),
            };

            LiveAudioObject::new(category, display, stable_id, self.index.to_string())
                .with_disambiguator(prop(PROP_BINARY))
        };

        LiveAudioObject {
            properties,
            ..object.with_volume(volume)
        }
    }
}

/// Parse the JSON printed by `pactl --format=json list <kind>`
pub fn parse_objects(category: TargetCategory, json: &str) -> Result<Vec<LiveAudioObject>> {
    let objects: Vec<PactlObject> =
        serde_json::from_str(json).map_err(|e| AudioError::Parse(e.to_string()))?;
    Ok(objects.into_iter().map(|o| o.into_live(category)).collect())
}

/// Whether a `pactl subscribe` line reports a stream appearing or vanishing
pub fn is_stream_lifecycle_event(line: &str) -> bool {
    let is_stream = line.contains("sink-input") || line.contains("source-output");
    let is_lifecycle = line.contains("'new'") || line.contains("'remove'");
    is_stream && is_lifecycle
}

/// Audio server driven through the `pactl` binary
pub struct PactlServer {
    binary: String,
}

impl PactlServer {
    /// Check that the server answers; failure here is fatal for the caller
    pub async fn connect() -> Result<Self> {
        Self::connect_with("pactl").await
    }

    pub async fn connect_with(binary: impl Into<String>) -> Result<Self> {
        let server = Self {
            binary: binary.into(),
        };
        let info = server.run(&["info"]).await.map_err(|e| match e {
            AudioError::Command(msg) => AudioError::Unavailable(msg),
            other => other,
        })?;

        let name = info
            .lines()
            .find_map(|l| l.strip_prefix("Server Name:"))
            .map(str::trim)
            .unwrap_or("unknown");
        info!(server = name, "Connected to audio server");
        Ok(server)
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!(binary = %self.binary, ?args, "Running audio server command");
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AudioError::Unavailable(format!("{}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AudioError::Command(format!(
                "{} {} failed: {}",
                self.binary,
                args.join(" "),
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout).map_err(|e| AudioError::Parse(e.to_string()))
    }

    /// Follow `pactl subscribe` and notify on stream add/remove
    ///
    /// The task ends when the child exits; the caller keeps polling anyway.
    pub fn spawn_subscription(&self, trigger: Arc<Notify>) -> JoinHandle<()> {
        let binary = self.binary.clone();
        tokio::spawn(async move {
            let child = Command::new(&binary)
                .arg("subscribe")
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .kill_on_drop(true)
                .spawn();

            let mut child = match child {
                Ok(child) => child,
                Err(e) => {
                    warn!(error = %e, "Failed to subscribe to audio server events");
                    return;
                }
            };
            let Some(stdout) = child.stdout.take() else {
                warn!("Audio server subscription has no output");
                return;
            };

            info!("Subscribed to audio server stream events");
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if is_stream_lifecycle_event(&line) {
                            debug!(event = %line, "Stream lifecycle event");
                            trigger.notify_one();
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Audio server subscription failed");
                        break;
                    }
                }
            }
            warn!("Audio server subscription ended");
        })
    }
}

#[async_trait]
impl AudioServer for PactlServer {
    async fn list(&self, category: TargetCategory) -> Result<Vec<LiveAudioObject>> {
        let json = self
            .run(&["--format=json", "list", list_kind(category)])
            .await?;
        parse_objects(category, &json)
    }

    async fn default_device(&self, category: TargetCategory) -> Result<Option<String>> {
        let command = match category {
            TargetCategory::OutputDevice => "get-default-sink",
            TargetCategory::InputDevice => "get-default-source",
            _ => return Ok(None),
        };
        let name = self.run(&[command]).await?;
        let name = name.trim();
        Ok((!name.is_empty()).then(|| name.to_string()))
    }

    async fn set_volume(&self, object: &LiveAudioObject, fraction: f32) -> Result<()> {
        let percent = format!("{}%", (fraction.clamp(0.0, 1.0) * 100.0).round() as u32);
        self.run(&[volume_command(object.category), &object.handle, &percent])
            .await
            .map(|_| ())
    }

    async fn set_default_output(&self, object: &LiveAudioObject) -> Result<()> {
        if object.category != TargetCategory::OutputDevice {
            return Err(AudioError::NotFound(object.name.clone()));
        }
        self.run(&["set-default-sink", &object.handle])
            .await
            .map(|_| ())
    }
}
