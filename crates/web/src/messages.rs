//! WebSocket JSON protocol
//!
//! Every frame is a JSON object with a `type` tag. Field names are
//! camelCase on the wire.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Messages sent by the browser
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    GetState,

    #[serde(rename_all = "camelCase")]
    SetVolume { source_id: String, volume: f64 },

    #[serde(rename_all = "camelCase")]
    UpdateControlValue {
        control_type: String,
        control_id: String,
        value: f64,
    },

    #[serde(rename_all = "camelCase")]
    AssignControl {
        control_type: String,
        control_id: String,
        source_id: String,
    },

    #[serde(rename_all = "camelCase")]
    UnassignControl {
        control_type: String,
        control_id: String,
        source_id: String,
    },

    /// Make a live output device the server default
    #[serde(rename_all = "camelCase")]
    SetDefaultOutput { source_id: String },
}

/// Messages pushed to the browser
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Welcome { message: String },

    AudioSourcesUpdate(SourcesUpdate),

    #[serde(rename_all = "camelCase")]
    ControlValueUpdate {
        control_type: String,
        control_id: String,
        value: u8,
    },
}

impl ServerMessage {
    pub fn welcome() -> Self {
        ServerMessage::Welcome {
            message: "Connected to faderlink".to_string(),
        }
    }
}

/// One selectable source in the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceView {
    pub id: String,
    pub name: String,
    pub binary_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub volume: u8,
}

/// Full picture of live sources and control assignments
///
/// Control values are only filled in for explicit `getState` replies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesUpdate {
    pub sources: Vec<SourceView>,
    pub slider_assignments: BTreeMap<String, Vec<String>>,
    pub knob_assignments: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slider_values: Option<BTreeMap<String, u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knob_values: Option<BTreeMap<String, u8>>,
}
