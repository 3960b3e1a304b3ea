//! MIDI transport over `midir`
//!
//! Ports are found by name. Incoming messages are decoded on the midir
//! callback thread and handed to the async side through a bounded channel;
//! when the channel is full the event is dropped.

use faderlink_core::domain::midi::ControlEvent;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

const CLIENT_NAME: &str = "faderlink";

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("MIDI device error: {0}")]
    Device(String),

    #[error("MIDI port error: {0}")]
    Port(String),

    #[error("MIDI port not found: {0}")]
    PortNotFound(String),
}

impl From<midir::InitError> for MidiError {
    fn from(e: midir::InitError) -> Self {
        MidiError::Device(e.to_string())
    }
}

impl From<midir::ConnectError<MidiInput>> for MidiError {
    fn from(e: midir::ConnectError<MidiInput>) -> Self {
        MidiError::Port(e.to_string())
    }
}

impl From<midir::PortInfoError> for MidiError {
    fn from(e: midir::PortInfoError) -> Self {
        MidiError::Port(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MidiError>;

/// Names of the available ports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MidiPorts {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Enumerate input and output ports
pub fn list_ports() -> Result<MidiPorts> {
    let input = MidiInput::new(CLIENT_NAME)?;
    let output = MidiOutput::new(CLIENT_NAME)?;

    let inputs = input
        .ports()
        .iter()
        .map(|p| input.port_name(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let outputs = output
        .ports()
        .iter()
        .map(|p| output.port_name(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(MidiPorts { inputs, outputs })
}

/// Index of the port matching `wanted`
///
/// An exact name wins; otherwise the first port whose name contains
/// `wanted` is used, since backends often append client numbers.
pub fn find_port(names: &[String], wanted: &str) -> Option<usize> {
    names
        .iter()
        .position(|n| n == wanted)
        .or_else(|| names.iter().position(|n| n.contains(wanted)))
}

/// Open input port; dropping it closes the port
pub struct MidiInputHandle {
    port_name: String,
    _connection: MidiInputConnection<()>,
}

impl MidiInputHandle {
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// Open the named input port and forward decoded events to `events`
pub fn open_input(wanted: &str, events: mpsc::Sender<ControlEvent>) -> Result<MidiInputHandle> {
    let mut input = MidiInput::new(CLIENT_NAME)?;
    input.ignore(Ignore::None);

    let ports = input.ports();
    let names = ports
        .iter()
        .map(|p| input.port_name(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let index = find_port(&names, wanted).ok_or_else(|| MidiError::PortNotFound(wanted.to_string()))?;
    let port_name = names[index].clone();

    let connection = input.connect(
        &ports[index],
        "faderlink-input",
        move |_timestamp, message, _| match ControlEvent::decode(message) {
            Some(event) => {
                trace!(?event, "MIDI event");
                if events.try_send(event).is_err() {
                    debug!("MIDI event queue full, dropping event");
                }
            }
            None => trace!(bytes = ?message, "Ignoring MIDI message"),
        },
        (),
    )?;

    info!(port = %port_name, "MIDI input opened");
    Ok(MidiInputHandle {
        port_name,
        _connection: connection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_port_prefers_exact_name() {
        let names = vec![
            "nanoKONTROL2:nanoKONTROL2 _ CTR 20:0".to_string(),
            "nanoKONTROL2 nanoKONTROL2 _ CTR".to_string(),
        ];
        assert_eq!(find_port(&names, "nanoKONTROL2 nanoKONTROL2 _ CTR"), Some(1));
        assert_eq!(find_port(&names, "_ CTR 20:0"), Some(0));
        assert_eq!(find_port(&names, "Launchpad"), None);
    }

    #[test]
    fn test_error_display() {
        let err = MidiError::PortNotFound("nanoKONTROL2".to_string());
        assert_eq!(err.to_string(), "MIDI port not found: nanoKONTROL2");
    }
}
