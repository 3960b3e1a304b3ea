//! faderlink infrastructure
//!
//! Adapters for the outside world: the PulseAudio/PipeWire server (driven
//! through `pactl`) and MIDI ports (through `midir`).

pub mod audio;
pub mod midi;

pub use audio::PactlServer;
pub use midi::{MidiError, MidiInputHandle, MidiPorts};
