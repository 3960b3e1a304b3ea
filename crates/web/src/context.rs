//! Shared state behind every browser connection
//!
//! Translates protocol messages into store and registry calls, and builds
//! the `audioSourcesUpdate` view of live sources and assignments.

use crate::error::{Result, UiError};
use crate::hub::{ClientHub, ClientId};
use crate::messages::{ClientMessage, ServerMessage, SourceView, SourcesUpdate};
use faderlink_core::domain::{
    AssignmentStore, AudioTargetRef, AudioTargetRegistry, ControlId, ControlKind, LiveAudioObject,
    TargetCategory,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Longest source id accepted from the browser
const MAX_SOURCE_ID_LEN: usize = 512;

/// What a UI source id refers to
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSelection {
    /// An object the audio server reports right now
    Live(LiveAudioObject),
    /// A `Type:Name` id for something that is not live
    Virtual(AudioTargetRef),
}

#[derive(Clone)]
pub struct WebContext {
    store: Arc<AssignmentStore>,
    registry: Arc<AudioTargetRegistry>,
    hub: Arc<ClientHub>,
    poll_trigger: Arc<Notify>,
}

impl WebContext {
    pub fn new(store: Arc<AssignmentStore>, registry: Arc<AudioTargetRegistry>) -> Self {
        Self {
            store,
            registry,
            hub: Arc::new(ClientHub::new()),
            poll_trigger: Arc::new(Notify::new()),
        }
    }

    pub fn store(&self) -> &Arc<AssignmentStore> {
        &self.store
    }

    pub fn hub(&self) -> &Arc<ClientHub> {
        &self.hub
    }

    /// Notified to run the structural poll ahead of schedule
    pub fn poll_trigger(&self) -> Arc<Notify> {
        self.poll_trigger.clone()
    }

    /// Live sources plus per-control assignments
    ///
    /// Stored targets map to the id of the live object they resolve to, or
    /// to their virtual `Type:Name` id when nothing live matches.
    pub async fn build_state(&self, include_values: bool) -> SourcesUpdate {
        let live = self.registry.enumerate().await;
        let config = self.store.snapshot();

        let mut update = SourcesUpdate {
            sources: live.iter().map(source_view).collect(),
            ..SourcesUpdate::default()
        };

        for binding in config.bindings() {
            let mut ids: Vec<String> = Vec::new();
            for target in binding.targets() {
                let id = live_id_for(target, &live).unwrap_or_else(|| target.virtual_id());
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }

            let key = binding.id.to_string();
            match binding.id.kind() {
                ControlKind::Slider => update.slider_assignments.insert(key, ids),
                ControlKind::Knob => update.knob_assignments.insert(key, ids),
            };
        }

        if include_values {
            let values_of = |kind: ControlKind| -> BTreeMap<String, u8> {
                config
                    .bindings_of(kind)
                    .map(|b| (b.id.to_string(), b.value.get()))
                    .collect()
            };
            update.slider_values = Some(values_of(ControlKind::Slider));
            update.knob_values = Some(values_of(ControlKind::Knob));
        }

        update
    }

    /// Handle one text frame from a client
    ///
    /// Bad frames are logged and dropped; the connection stays open.
    pub async fn handle_text(&self, client: ClientId, text: &str) {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(client, error = %e, "Ignoring malformed message");
                return;
            }
        };

        match self.handle(message).await {
            Ok(Some(reply)) => match serde_json::to_string(&reply) {
                Ok(frame) => {
                    self.hub.send_to(client, frame);
                }
                Err(e) => warn!(client, error = %e, "Failed to encode reply"),
            },
            Ok(None) => {}
            Err(e) => warn!(client, error = %e, "Request rejected"),
        }
    }

    pub async fn handle(&self, message: ClientMessage) -> Result<Option<ServerMessage>> {
        match message {
            ClientMessage::GetState => {
                let state = self.build_state(true).await;
                Ok(Some(ServerMessage::AudioSourcesUpdate(state)))
            }
            ClientMessage::SetVolume { source_id, volume } => {
                self.set_volume(&source_id, volume).await?;
                Ok(None)
            }
            ClientMessage::UpdateControlValue {
                control_type,
                control_id,
                value,
            } => {
                let control = parse_control(&control_type, &control_id)?;
                let value = validate_percent(value)?;
                self.store.update_value(control, value);
                Ok(None)
            }
            ClientMessage::AssignControl {
                control_type,
                control_id,
                source_id,
            } => {
                let control = parse_control(&control_type, &control_id)?;
                self.assign(control, &source_id).await?;
                Ok(None)
            }
            ClientMessage::UnassignControl {
                control_type,
                control_id,
                source_id,
            } => {
                let control = parse_control(&control_type, &control_id)?;
                self.unassign(control, &source_id).await?;
                Ok(None)
            }
            ClientMessage::SetDefaultOutput { source_id } => {
                self.set_default_output(&source_id).await?;
                self.poll_trigger.notify_one();
                Ok(None)
            }
        }
    }

    /// Look up a UI source id, live objects first
    pub async fn select_source(&self, source_id: &str) -> Result<SourceSelection> {
        let source_id = validate_source_id(source_id)?;
        if let Some(object) = self.registry.find_by_stable_id(source_id).await {
            return Ok(SourceSelection::Live(object));
        }
        parse_virtual_id(source_id)
            .map(SourceSelection::Virtual)
            .ok_or_else(|| UiError::UnknownSource(source_id.to_string()))
    }

    async fn set_volume(&self, source_id: &str, volume: f64) -> Result<()> {
        let percent = validate_percent(volume)?.clamp(0, 100);
        match self.select_source(source_id).await? {
            SourceSelection::Live(object) => {
                let applied = self
                    .registry
                    .apply_volume(std::slice::from_ref(&object), percent as f32 / 100.0)
                    .await;
                if applied == 0 {
                    return Err(UiError::VolumeFailed(object.display_name()));
                }
                debug!(source = %object.display_name(), volume = percent, "Volume set from UI");
                Ok(())
            }
            SourceSelection::Virtual(_) => Err(UiError::InactiveSource(source_id.to_string())),
        }
    }

    async fn set_default_output(&self, source_id: &str) -> Result<()> {
        let object = match self.select_source(source_id).await? {
            SourceSelection::Live(object) => object,
            SourceSelection::Virtual(_) => {
                return Err(UiError::InactiveSource(source_id.to_string()))
            }
        };
        if object.category != TargetCategory::OutputDevice {
            return Err(UiError::NotAnOutput(object.display_name()));
        }
        self.registry
            .set_default_output(&object.name)
            .await
            .map_err(|e| {
                warn!(device = %object.name, error = %e, "Failed to set default output");
                UiError::DefaultFailed(object.name.clone())
            })?;
        info!(device = %object.name, "Default output set from UI");
        Ok(())
    }

    async fn assign(&self, control: ControlId, source_id: &str) -> Result<()> {
        let target = match self.select_source(source_id).await? {
            SourceSelection::Live(object) => object.to_ref(),
            SourceSelection::Virtual(target) => target,
        };
        if self.store.assign(control, target.clone()) {
            info!(%control, %target, "Assigned from UI");
        }
        Ok(())
    }

    async fn unassign(&self, control: ControlId, source_id: &str) -> Result<()> {
        let removed = match self.select_source(source_id).await? {
            SourceSelection::Live(object) => {
                let stored = self
                    .store
                    .binding(control)
                    .map(|b| b.targets().to_vec())
                    .unwrap_or_default();
                stored
                    .iter()
                    .filter(|t| resolves_to(t, &object))
                    .filter(|t| self.store.unassign_exact(control, t))
                    .count()
            }
            SourceSelection::Virtual(target) => self
                .store
                .unassign(control, target.category, &target.name, None)
                .len(),
        };

        if removed == 0 {
            debug!(%control, source_id, "Nothing to unassign");
        }
        Ok(())
    }
}

fn source_view(object: &LiveAudioObject) -> SourceView {
    SourceView {
        id: object.stable_id.clone(),
        name: object.name.clone(),
        binary_name: object.disambiguator.clone().unwrap_or_default(),
        kind: object.category.as_str().to_string(),
        volume: object.volume,
    }
}

/// Whether a stored ref would drive this live object
fn resolves_to(target: &AudioTargetRef, object: &LiveAudioObject) -> bool {
    target.category == object.category
        && target.name == object.name
        && target
            .disambiguator()
            .map_or(true, |d| object.disambiguator.as_deref() == Some(d))
}

fn live_id_for(target: &AudioTargetRef, live: &[LiveAudioObject]) -> Option<String> {
    live.iter()
        .find(|o| resolves_to(target, o))
        .map(|o| o.stable_id.clone())
}

/// Parse a `Type:Name` id; the type is matched leniently
pub fn parse_virtual_id(id: &str) -> Option<AudioTargetRef> {
    let (kind, name) = id.split_once(':')?;
    let category = TargetCategory::parse_loose(kind)?;
    if name.is_empty() {
        return None;
    }
    Some(AudioTargetRef::new(category, name))
}

/// Resolve `controlType` + `controlId`, which must agree
pub fn parse_control(control_type: &str, control_id: &str) -> Result<ControlId> {
    let kind: ControlKind = control_type
        .parse()
        .map_err(|_| UiError::InvalidControl(format!("unknown control type '{}'", control_type)))?;
    let control: ControlId = control_id
        .parse()
        .map_err(|_| UiError::InvalidControl(format!("bad control id '{}'", control_id)))?;

    if control.kind() != kind {
        return Err(UiError::InvalidControl(format!(
            "'{}' is not a {}",
            control_id, kind
        )));
    }
    Ok(control)
}

/// Round a numeric percentage; range clamping is left to the caller
pub fn validate_percent(value: f64) -> Result<i64> {
    if !value.is_finite() {
        return Err(UiError::InvalidValue(value.to_string()));
    }
    Ok(value.round() as i64)
}

pub fn validate_source_id(source_id: &str) -> Result<&str> {
    let trimmed = source_id.trim();
    if trimmed.is_empty() {
        return Err(UiError::InvalidSource("source id cannot be empty".to_string()));
    }
    if trimmed.len() > MAX_SOURCE_ID_LEN {
        return Err(UiError::InvalidSource(format!(
            "source id too long ({} chars)",
            trimmed.len()
        )));
    }
    Ok(trimmed)
}
